//! Profile-picture ingestion.
//!
//! An upload goes through: extension allow-list, random filename, decode,
//! downsample to fit `THUMBNAIL_SIZE`, re-encode, write to the store, and
//! finally removal of the picture it replaces. Decoding happens before the
//! store is touched, so a bad upload never leaves anything behind.

use crate::models::user::DEFAULT_PICTURE;
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::{rngs::OsRng, RngCore};
use std::{
    io::{self, Cursor},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Neither side of a stored picture exceeds this many pixels.
pub const THUMBNAIL_SIZE: u32 = 125;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

const TOKEN_BYTES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PictureError {
    #[error("File type not allowed. Use jpg, jpeg or png")]
    UnsupportedExtension,
    #[error("Image could not be decoded: {0}")]
    ImageDecode(String),
    #[error("Image could not be encoded: {0}")]
    ImageEncode(String),
    #[error("Failed to write picture {filename}: {source}")]
    StorageWrite {
        filename: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to delete picture {filename}: {source}")]
    StorageDelete {
        filename: String,
        #[source]
        source: io::Error,
    },
    #[error("Image processing task failed: {0}")]
    Task(String),
}

/// A file part taken from the profile form.
#[derive(Debug, Clone)]
pub struct PictureUpload {
    pub filename: String,
    pub bytes: Bytes,
}

/// Flat, filename-keyed storage for encoded pictures.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PictureStore: Send + Sync {
    async fn write(&self, filename: &str, bytes: Vec<u8>) -> io::Result<()>;
    async fn remove(&self, filename: &str) -> io::Result<()>;
}

pub struct FsPictureStore {
    root: PathBuf,
}

impl FsPictureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the directory and the placeholder picture if either is missing.
    pub async fn init(root: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root).await?;

        let placeholder = store.root.join(DEFAULT_PICTURE);
        if !tokio::fs::try_exists(&placeholder).await? {
            let bytes = placeholder_jpeg()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            tokio::fs::write(&placeholder, bytes).await?;
            info!(path = %placeholder.display(), "Created placeholder profile picture");
        }

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, filename: &str) -> io::Result<PathBuf> {
        let is_bare_name = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\']);
        if !is_bare_name {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a bare picture filename: {filename:?}"),
            ));
        }
        Ok(self.root.join(filename))
    }
}

#[async_trait]
impl PictureStore for FsPictureStore {
    async fn write(&self, filename: &str, bytes: Vec<u8>) -> io::Result<()> {
        let path = self.path_for(filename)?;
        let partial = path.with_extension("part");

        let written = match tokio::fs::write(&partial, bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &path).await,
            Err(err) => Err(err),
        };
        if written.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        written
    }

    async fn remove(&self, filename: &str) -> io::Result<()> {
        let path = self.path_for(filename)?;
        tokio::fs::remove_file(path).await
    }
}

pub struct PictureService {
    backend: Arc<dyn PictureStore>,
}

impl PictureService {
    pub fn new(backend: Arc<dyn PictureStore>) -> Self {
        Self { backend }
    }

    /// Stores `upload` and removes `previous`, returning the new filename.
    ///
    /// If the previous picture cannot be removed for any reason other than it
    /// already being gone, the new file is discarded again and the error is
    /// returned, so the store keeps exactly one picture for the user.
    pub async fn ingest(
        &self,
        upload: PictureUpload,
        previous: &str,
    ) -> Result<String, PictureError> {
        let filename = self.store(upload).await?;

        if let Err(err) = self.retire(previous).await {
            self.discard(&filename).await;
            return Err(err);
        }

        Ok(filename)
    }

    /// Validates, resizes and writes `upload` under a fresh random name.
    pub async fn store(&self, upload: PictureUpload) -> Result<String, PictureError> {
        let extension =
            allowed_extension(&upload.filename).ok_or(PictureError::UnsupportedExtension)?;
        let format = format_for_extension(extension);
        let filename = format!("{}.{}", random_token(), extension);

        let bytes = upload.bytes;
        let encoded = tokio::task::spawn_blocking(move || render_thumbnail(&bytes, format))
            .await
            .map_err(|e| PictureError::Task(e.to_string()))??;

        self.backend
            .write(&filename, encoded)
            .await
            .map_err(|source| PictureError::StorageWrite {
                filename: filename.clone(),
                source,
            })?;

        info!(%filename, "Stored profile picture");
        Ok(filename)
    }

    /// Removes a replaced picture. The placeholder is never removed and an
    /// already-missing file counts as removed.
    pub async fn retire(&self, previous: &str) -> Result<(), PictureError> {
        if previous == DEFAULT_PICTURE {
            return Ok(());
        }

        match self.backend.remove(previous).await {
            Ok(()) => {
                debug!(filename = previous, "Removed replaced profile picture");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(filename = previous, "Replaced profile picture was already gone");
                Ok(())
            }
            Err(source) => Err(PictureError::StorageDelete {
                filename: previous.to_string(),
                source,
            }),
        }
    }

    /// Best-effort removal of a picture stored by a failed update.
    pub async fn discard(&self, filename: &str) {
        if let Err(err) = self.backend.remove(filename).await {
            warn!(%filename, error = %err, "Failed to discard orphaned profile picture");
        }
    }
}

/// Returns the lower-cased extension of `filename` if it is allow-listed.
pub fn allowed_extension(filename: &str) -> Option<&'static str> {
    let (stem, extension) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .into_iter()
        .find(|allowed| *allowed == extension)
}

fn format_for_extension(extension: &str) -> ImageFormat {
    match extension {
        "png" => ImageFormat::Png,
        _ => ImageFormat::Jpeg,
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Decodes `bytes`, shrinks the image to fit the thumbnail box (never
/// enlarging it) and encodes the result as `format`.
fn render_thumbnail(bytes: &[u8], format: ImageFormat) -> Result<Vec<u8>, PictureError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PictureError::ImageDecode(e.to_string()))?;

    let resized = if decoded.width() > THUMBNAIL_SIZE || decoded.height() > THUMBNAIL_SIZE {
        decoded.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE)
    } else {
        decoded
    };

    // JPEG has no alpha channel
    let output = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    encode(&output, format).map_err(|e| PictureError::ImageEncode(e.to_string()))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format)?;
    Ok(out.into_inner())
}

fn placeholder_jpeg() -> image::ImageResult<Vec<u8>> {
    let grey = RgbImage::from_pixel(THUMBNAIL_SIZE, THUMBNAIL_SIZE, Rgb([200, 200, 200]));
    encode(&DynamicImage::ImageRgb8(grey), ImageFormat::Jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn png_upload(filename: &str, width: u32, height: u32) -> PictureUpload {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 120, 200])));
        PictureUpload {
            filename: filename.to_string(),
            bytes: Bytes::from(encode(&image, ImageFormat::Png).unwrap()),
        }
    }

    fn accepting_writes(mock: &mut MockPictureStore) {
        mock.expect_write()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
    }

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("me.jpg"), Some("jpg"));
        assert_eq!(allowed_extension("me.JPEG"), Some("jpeg"));
        assert_eq!(allowed_extension("archive.tar.png"), Some("png"));
        assert_eq!(allowed_extension("me.gif"), None);
        assert_eq!(allowed_extension("jpg"), None);
        assert_eq!(allowed_extension(".png"), None);
        assert_eq!(allowed_extension(""), None);
    }

    #[test]
    fn test_random_token_shape() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_render_thumbnail_keeps_aspect_ratio() {
        let upload = png_upload("wide.png", 300, 200);
        let encoded = render_thumbnail(&upload.bytes, ImageFormat::Png).unwrap();
        let thumb = image::load_from_memory(&encoded).unwrap();

        assert_eq!(thumb.width(), 125);
        assert!(thumb.height() < thumb.width());
        assert!((82..=84).contains(&thumb.height()));
    }

    #[test]
    fn test_render_thumbnail_never_enlarges() {
        let upload = png_upload("small.png", 40, 30);
        let encoded = render_thumbnail(&upload.bytes, ImageFormat::Jpeg).unwrap();
        let thumb = image::load_from_memory(&encoded).unwrap();

        assert_eq!((thumb.width(), thumb.height()), (40, 30));
        assert_eq!(image::guess_format(&encoded).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_render_thumbnail_rejects_garbage() {
        let result = render_thumbnail(b"definitely not an image", ImageFormat::Png);
        assert!(matches!(result, Err(PictureError::ImageDecode(_))));
    }

    #[tokio::test]
    async fn test_ingest_over_default_does_not_delete() {
        let mut mock_store = MockPictureStore::new();
        accepting_writes(&mut mock_store);
        mock_store.expect_remove().never();

        let service = PictureService::new(Arc::new(mock_store));
        let filename = service
            .ingest(png_upload("me.jpg", 300, 300), DEFAULT_PICTURE)
            .await
            .unwrap();

        assert_ne!(filename, DEFAULT_PICTURE);
        assert!(filename.ends_with(".jpg"));
        assert_eq!(filename.len(), 16 + ".jpg".len());
    }

    #[tokio::test]
    async fn test_ingest_removes_previous_picture() {
        let mut mock_store = MockPictureStore::new();
        accepting_writes(&mut mock_store);
        mock_store
            .expect_remove()
            .with(eq("abc123.png"))
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));

        let service = PictureService::new(Arc::new(mock_store));
        let filename = service
            .ingest(png_upload("new.png", 64, 64), "abc123.png")
            .await
            .unwrap();

        assert!(filename.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_ingest_swallows_missing_previous_picture() {
        let mut mock_store = MockPictureStore::new();
        accepting_writes(&mut mock_store);
        mock_store.expect_remove().times(1).returning(|_| {
            Box::pin(async { Err(io::Error::from(io::ErrorKind::NotFound)) })
        });

        let service = PictureService::new(Arc::new(mock_store));
        let result = service
            .ingest(png_upload("new.png", 64, 64), "gone.png")
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_ingest_discards_new_picture_when_delete_fails() {
        let mut mock_store = MockPictureStore::new();
        accepting_writes(&mut mock_store);
        mock_store.expect_remove().times(2).returning(|filename| {
            let locked = filename.starts_with("locked");
            Box::pin(async move {
                if locked {
                    Err(io::Error::from(io::ErrorKind::PermissionDenied))
                } else {
                    Ok(())
                }
            })
        });

        let service = PictureService::new(Arc::new(mock_store));
        let result = service
            .ingest(png_upload("new.png", 64, 64), "locked.png")
            .await;

        assert!(matches!(
            result,
            Err(PictureError::StorageDelete { ref filename, .. }) if filename == "locked.png"
        ));
    }

    #[tokio::test]
    async fn test_unsupported_extension_touches_nothing() {
        let mut mock_store = MockPictureStore::new();
        mock_store.expect_write().never();
        mock_store.expect_remove().never();

        let service = PictureService::new(Arc::new(mock_store));
        let result = service
            .ingest(png_upload("me.gif", 64, 64), "abc123.png")
            .await;

        assert!(matches!(result, Err(PictureError::UnsupportedExtension)));
    }

    #[tokio::test]
    async fn test_decode_failure_touches_nothing() {
        let mut mock_store = MockPictureStore::new();
        mock_store.expect_write().never();
        mock_store.expect_remove().never();

        let service = PictureService::new(Arc::new(mock_store));
        let upload = PictureUpload {
            filename: "me.png".to_string(),
            bytes: Bytes::from_static(b"\x89PNG but not really"),
        };
        let result = service.ingest(upload, "abc123.png").await;

        assert!(matches!(result, Err(PictureError::ImageDecode(_))));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_previous_picture() {
        let mut mock_store = MockPictureStore::new();
        mock_store
            .expect_write()
            .times(1)
            .returning(|_, _| Box::pin(async { Err(io::Error::from(io::ErrorKind::Other)) }));
        mock_store.expect_remove().never();

        let service = PictureService::new(Arc::new(mock_store));
        let result = service
            .ingest(png_upload("me.png", 64, 64), "abc123.png")
            .await;

        assert!(matches!(result, Err(PictureError::StorageWrite { .. })));
    }

    #[tokio::test]
    async fn test_fs_store_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPictureStore::init(dir.path()).await.unwrap();

        assert!(dir.path().join(DEFAULT_PICTURE).exists());

        store.write("abc.png", vec![1, 2, 3]).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("abc.png")).unwrap(), vec![1, 2, 3]);
        assert!(!dir.path().join("abc.part").exists());

        store.remove("abc.png").await.unwrap();
        assert!(!dir.path().join("abc.png").exists());

        let missing = store.remove("abc.png").await.unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fs_store_cleans_up_when_rename_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPictureStore::new(dir.path());

        // A non-empty directory cannot be replaced by a file
        std::fs::create_dir(dir.path().join("abc.png")).unwrap();
        std::fs::write(dir.path().join("abc.png").join("keep"), b"x").unwrap();

        assert!(store.write("abc.png", vec![1, 2, 3]).await.is_err());
        assert!(!dir.path().join("abc.part").exists());
        assert!(dir.path().join("abc.png").is_dir());
    }

    #[tokio::test]
    async fn test_fs_store_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPictureStore::new(dir.path());

        for name in ["../escape.png", "nested/pic.png", ".hidden", ""] {
            let err = store.remove(name).await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{name}");
        }
    }
}
