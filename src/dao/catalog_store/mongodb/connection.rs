use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::timeout;

use super::error::{MongoDaoError, MongoResult};

/// Upper bound for the first ping of a fresh client.
const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a client and make sure the server answers one ping.
///
/// A single attempt is made; the storage supervisor owns the retry schedule.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    match timeout(CONNECT_PING_TIMEOUT, database.run_command(doc! { "ping": 1 })).await {
        Ok(Ok(_)) => Ok((client, database)),
        Ok(Err(source)) => Err(MongoDaoError::InitialPing { source }),
        Err(_) => Err(MongoDaoError::PingTimeout {
            timeout: CONNECT_PING_TIMEOUT,
        }),
    }
}
