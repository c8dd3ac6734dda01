//! Download cover images and keep them next to the server as `<game id>.<ext>`.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::{Client, StatusCode, Url, redirect::Policy};
use thiserror::Error;
use tokio::{fs, sync::OnceCell};
use tracing::{info, warn};

use crate::{
    dao::models::GameId, error::ServiceError, services::game_service, state::SharedState,
};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 3;
/// Largest cover image accepted, checked against both the declared and the received length.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const USER_AGENT: &str = concat!("lan-game-list/", env!("CARGO_PKG_VERSION"));

/// Failures raised while fetching or storing an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image URL `{0}`")]
    InvalidUrl(String),
    #[error("failed to build image HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to download image from `{url}`")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected status {status} downloading `{url}`")]
    DownloadStatus { url: String, status: StatusCode },
    #[error("image at `{url}` exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: usize },
    #[error("downloaded data is not a JPEG, PNG, GIF or WEBP image")]
    UnsupportedFormat,
    #[error("failed to write image file `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl From<ImageError> for ServiceError {
    fn from(err: ImageError) -> Self {
        match err {
            err @ ImageError::InvalidUrl(_) => ServiceError::ValidationFailure(err.to_string()),
            err @ ImageError::Io { .. } => ServiceError::Internal(err.to_string()),
            other => ServiceError::UpstreamFailure(other.to_string()),
        }
    }
}

/// Raster formats accepted for cover images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Identify an image from its magic bytes.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(ImageFormat::Webp),
        _ => None,
    }
}

/// Where an image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub file_name: String,
    pub local_path: String,
}

/// Accept only absolute http(s) URLs.
pub fn parse_image_url(raw: &str) -> Result<Url, ImageError> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
        _ => Err(ImageError::InvalidUrl(raw.to_owned())),
    }
}

pub struct ImageFetcher {
    image_dir: PathBuf,
    max_bytes: usize,
    http: OnceCell<Client>,
}

impl ImageFetcher {
    pub fn new(image_dir: PathBuf) -> Self {
        Self {
            image_dir,
            max_bytes: MAX_IMAGE_BYTES,
            http: OnceCell::new(),
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[cfg(test)]
    fn with_client(mut self, client: Client) -> Self {
        self.http = OnceCell::new_with(Some(client));
        self
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    async fn http(&self) -> Result<&Client, ImageError> {
        self.http
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(DOWNLOAD_TIMEOUT)
                    .redirect(Policy::limited(MAX_REDIRECTS))
                    .user_agent(USER_AGENT)
                    .build()
                    .map_err(|source| ImageError::ClientBuilder { source })
            })
            .await
    }

    /// Download the raw bytes behind `url`, at most `max_bytes` of them.
    pub async fn fetch(&self, url: Url) -> Result<Vec<u8>, ImageError> {
        let label = url.to_string();
        let mut response = self
            .http()
            .await?
            .get(url)
            .send()
            .await
            .map_err(|source| ImageError::Download {
                url: label.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(ImageError::DownloadStatus {
                url: label,
                status: response.status(),
            });
        }

        let too_large = |url: String| ImageError::TooLarge {
            url,
            limit: self.max_bytes,
        };
        let declared = response.content_length().unwrap_or(0);
        if declared > self.max_bytes as u64 {
            return Err(too_large(label));
        }

        let mut body = Vec::with_capacity(declared as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| ImageError::Download {
                url: label.clone(),
                source,
            })?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(too_large(label));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Fetch `url` and store it as the image of `game_id`.
    pub async fn download(&self, game_id: GameId, url: Url) -> Result<StoredImage, ImageError> {
        let bytes = self.fetch(url).await?;
        self.store_image(game_id, &bytes).await
    }

    /// Validate `bytes` and write them as the only image of `game_id`.
    pub async fn store_image(
        &self,
        game_id: GameId,
        bytes: &[u8],
    ) -> Result<StoredImage, ImageError> {
        let format = detect_image_format(bytes).ok_or(ImageError::UnsupportedFormat)?;
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ImageError::Io { path, source }
        };

        fs::create_dir_all(&self.image_dir)
            .await
            .map_err(io_error(&self.image_dir))?;
        self.remove_existing(game_id).await?;

        let file_name = format!("{game_id}.{}", format.extension());
        let path = self.image_dir.join(&file_name);
        fs::write(&path, bytes).await.map_err(io_error(&path))?;

        Ok(StoredImage {
            local_path: path.display().to_string(),
            file_name,
        })
    }

    /// Delete every `<game_id>.*` file in the image directory.
    async fn remove_existing(&self, game_id: GameId) -> Result<(), ImageError> {
        let stem = game_id.to_string();
        let mut entries =
            fs::read_dir(&self.image_dir)
                .await
                .map_err(|source| ImageError::Io {
                    path: self.image_dir.clone(),
                    source,
                })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| ImageError::Io {
            path: self.image_dir.clone(),
            source,
        })? {
            let path = entry.path();
            let same_game = path
                .file_stem()
                .is_some_and(|file_stem| file_stem.to_string_lossy() == stem);
            if !same_game {
                continue;
            }
            let file_type = entry.file_type().await.map_err(|source| ImageError::Io {
                path: path.clone(),
                source,
            })?;
            if file_type.is_file() {
                fs::remove_file(&path)
                    .await
                    .map_err(|source| ImageError::Io { path, source })?;
            }
        }
        Ok(())
    }
}

/// Download the cover of `game_id`, store it locally and drop the remote URL.
pub async fn download_game_image(
    state: &SharedState,
    game_id: GameId,
    url: &str,
) -> Result<StoredImage, ServiceError> {
    let url = parse_image_url(url)?;
    let store = state.require_catalog_store().await?;
    if store.find_game(game_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("game `{game_id}` not found")));
    }

    let stored = state
        .images()
        .download(game_id, url.clone())
        .await
        .map_err(|err| {
            warn!(game_id, url = %url, error = %err, "image download failed");
            ServiceError::from(err)
        })?;

    game_service::clear_image_url(state, game_id).await?;
    info!(game_id, path = %stored.local_path, "image stored");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];

    #[test]
    fn detects_supported_formats() {
        assert_eq!(detect_image_format(JPEG_HEADER), Some(ImageFormat::Jpeg));
        assert_eq!(detect_image_format(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(detect_image_format(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(
            detect_image_format(b"RIFF\x24\0\0\0WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(detect_image_format(b"<!DOCTYPE html>"), None);
        assert_eq!(detect_image_format(&[]), None);
    }

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(parse_image_url(" https://images.igdb.com/cover.jpg ").is_ok());
        assert!(parse_image_url("http://example.com/a.png").is_ok());
        assert!(parse_image_url("ftp://example.com/a.png").is_err());
        assert!(parse_image_url("file:///etc/passwd").is_err());
        assert!(parse_image_url("not a url").is_err());
    }

    #[tokio::test]
    async fn storing_replaces_previous_images_of_the_same_game() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ImageFetcher::new(dir.path().join("img"));

        let first = fetcher.store_image(42, JPEG_HEADER).await.unwrap();
        assert_eq!(first.file_name, "42.jpg");
        fetcher.store_image(7, JPEG_HEADER).await.unwrap();

        let second = fetcher.store_image(42, PNG_HEADER).await.unwrap();
        assert_eq!(second.file_name, "42.png");

        let img = dir.path().join("img");
        assert!(!img.join("42.jpg").exists());
        assert!(img.join("42.png").exists());
        assert!(img.join("7.jpg").exists());
        assert_eq!(std::fs::read(img.join("42.png")).unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn directories_sharing_the_game_stem_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("42.old")).unwrap();
        let fetcher = ImageFetcher::new(dir.path().to_path_buf());

        fetcher.store_image(42, JPEG_HEADER).await.unwrap();

        assert!(dir.path().join("42.old").is_dir());
        assert!(dir.path().join("42.jpg").is_file());
    }

    #[tokio::test]
    async fn garbage_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ImageFetcher::new(dir.path().to_path_buf());

        let err = fetcher.store_image(1, b"<html>").await.unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedFormat));
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::UpstreamFailure(_)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Serve one raw HTTP/1.1 response on a local port and return its URL.
    async fn serve_once(head: String, body: Vec<u8>) -> Url {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        Url::parse(&format!("http://{addr}/cover.png")).unwrap()
    }

    fn local_fetcher(dir: &Path) -> ImageFetcher {
        let client = Client::builder().no_proxy().build().unwrap();
        ImageFetcher::new(dir.to_path_buf())
            .with_max_bytes(16)
            .with_client(client)
    }

    #[tokio::test]
    async fn declared_length_over_the_limit_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());
        let body = vec![0_u8; 64];
        let url = serve_once(
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()),
            body,
        )
        .await;

        let err = fetcher.fetch(url).await.unwrap_err();
        assert!(matches!(err, ImageError::TooLarge { limit: 16, .. }));
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::UpstreamFailure(_)
        ));
    }

    #[tokio::test]
    async fn undeclared_body_is_cut_at_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".into(),
            vec![0_u8; 64],
        )
        .await;

        let err = fetcher.fetch(url).await.unwrap_err();
        assert!(matches!(err, ImageError::TooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn body_within_the_limit_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = local_fetcher(dir.path());
        let url = serve_once(
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", PNG_HEADER.len()),
            PNG_HEADER.to_vec(),
        )
        .await;

        assert_eq!(fetcher.fetch(url).await.unwrap(), PNG_HEADER);
    }

    #[tokio::test]
    async fn download_rejects_bad_urls_and_unknown_games() {
        let (state, _) = test_support::memory_state().await;
        assert!(matches!(
            download_game_image(&state, 42, "javascript:alert(1)").await,
            Err(ServiceError::ValidationFailure(_))
        ));
        assert!(matches!(
            download_game_image(&state, 42, "https://example.com/cover.jpg").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
