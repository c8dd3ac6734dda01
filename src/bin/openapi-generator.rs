use anyhow::Context;
use lan_game_list::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi();
    println!("{}", doc.to_pretty_json().context("serializing OpenAPI document")?);
    Ok(())
}
