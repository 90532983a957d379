//! Image I/O operations service
//!
//! Keeps decoding and encoding out of the normalization pipeline so the
//! pipeline itself stays a pure function of pixel data.

use crate::{
    config::OutputFormat,
    error::{FundusError, Result},
};
use image::{DynamicImage, ImageError, ImageFormat};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Tries the format implied by the extension first, then falls back to
    /// content sniffing so mislabeled uploads still decode.
    ///
    /// # Errors
    /// - `FundusError::Io` if the file cannot be read
    /// - `FundusError::Decode` if the bytes are not a supported raster image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use fundus_norm::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("fundus.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        let data = std::fs::read(path_ref)
            .map_err(|e| FundusError::file_io_error("read image file", path_ref, &e))?;

        if let Ok(format) = ImageFormat::from_path(path_ref) {
            match image::load_from_memory_with_format(&data, format) {
                Ok(img) => return Ok(img),
                Err(e) => {
                    debug!(
                        path = %path_ref.display(),
                        error = %e,
                        "Extension-based decoding failed, attempting content-based detection"
                    );
                },
            }
        }

        image::load_from_memory(&data).map_err(|e| FundusError::image_load_error(path_ref, &e))
    }

    /// Load an image from bytes
    ///
    /// # Errors
    /// - `FundusError::Decode` if the bytes are not a supported raster image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| FundusError::decode(format!("Failed to decode image from bytes: {}", e)))
    }

    /// Load an image from an async reader
    ///
    /// # Errors
    /// - `FundusError::Io` if reading the stream fails
    /// - `FundusError::Decode` if the bytes are not a supported raster image
    ///
    /// # Examples
    /// ```rust,no_run
    /// use fundus_norm::services::ImageIOService;
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let file = File::open("fundus.png").await?;
    /// let image = ImageIOService::load_from_reader(file).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(mut reader: R) -> Result<DynamicImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;

        Self::load_from_bytes(&buffer)
    }

    /// Encode an image in the specified format
    ///
    /// The output is always 8-bit RGB; fundus images carry no alpha.
    ///
    /// # Errors
    /// - `FundusError::UnsupportedFormat` if the codec is not compiled in
    pub fn encode(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let rgb_image = image.to_rgb8();
        let mut buffer = Vec::new();

        let result = match format {
            OutputFormat::Jpeg => {
                let mut jpeg_encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, jpeg_quality);
                jpeg_encoder.encode_image(&rgb_image)
            },
            OutputFormat::Png | OutputFormat::Tiff | OutputFormat::Bmp | OutputFormat::WebP => {
                let mut cursor = std::io::Cursor::new(&mut buffer);
                rgb_image.write_to(&mut cursor, format.image_format())
            },
        };

        result.map_err(|e| match e {
            ImageError::Unsupported(_) => {
                FundusError::unsupported_format(format!("Cannot encode {}: {}", format, e))
            },
            other => FundusError::internal(format!("Failed to encode {}: {}", format, other)),
        })?;

        Ok(buffer)
    }

    /// Write bytes to `path` through a temporary file in the same directory
    ///
    /// The destination is replaced only after the full payload is on disk, so
    /// a failed write leaves any existing file untouched.
    ///
    /// # Errors
    /// - `FundusError::Io` if the directory is not writable or the rename fails
    pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        let parent = match path_ref.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        std::fs::create_dir_all(parent)
            .map_err(|e| FundusError::file_io_error("create output directory", parent, &e))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| FundusError::file_io_error("create temporary file in", parent, &e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.flush())
            .map_err(|e| FundusError::file_io_error("write", temp.path(), &e))?;
        temp.persist(path_ref)
            .map_err(|e| FundusError::file_io_error("replace", path_ref, &e.error))?;

        debug!(path = %path_ref.display(), bytes = bytes.len(), "Wrote image");
        Ok(())
    }

    /// Encode and atomically save an image
    ///
    /// # Errors
    /// - Encoding or write failures (see [`Self::encode`], [`Self::write_atomic`])
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<()> {
        let bytes = Self::encode(image, format, jpeg_quality)?;
        Self::write_atomic(path, &bytes)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }
}
