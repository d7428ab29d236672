use crate::view::Extent;
use image::imageops::FilterType;
use image::{ColorType, ImageFormat, RgbImage};
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tiff::decoder::Decoder;
use tiff::tags::Tag;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode raster {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot read GeoTIFF tags of {path}: {source}")]
    GeoTags {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("{path} has no red/green/blue channels (decoded as {color:?})")]
    MissingColorChannels { path: PathBuf, color: ColorType },
    #[error("{path} has no pixels")]
    Empty { path: PathBuf },
}

/// Affine pixel -> world transform, GDAL/rasterio order:
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// What an image without georeferencing gets: pixel units, y downward.
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// From the 4x4 row-major `ModelTransformationTag` matrix.
    pub fn from_model_transformation(m: &[f64]) -> Option<Self> {
        if m.len() < 16 {
            return None;
        }
        Some(Self {
            a: m[0],
            b: m[1],
            c: m[3],
            d: m[4],
            e: m[5],
            f: m[7],
        })
    }

    /// From `ModelPixelScaleTag` and the first `ModelTiepointTag` entry.
    /// Raster rows run against the model's y axis.
    pub fn from_scale_and_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Option<Self> {
        let [sx, sy, ..] = *scale else {
            return None;
        };
        let [i, j, _k, x, y, ..] = *tiepoint else {
            return None;
        };
        Some(Self {
            a: sx,
            b: 0.0,
            c: x - i * sx,
            d: 0.0,
            e: -sy,
            f: y + j * sy,
        })
    }

    /// `(left, right, bottom, top)` of a `width` x `height` raster.
    pub fn extent(&self, width: u32, height: u32) -> Extent {
        let left = self.c;
        let top = self.f;
        Extent::new(
            left,
            left + self.a * width as f64,
            top + self.e * height as f64,
            top,
        )
    }

    /// Ground size of one pixel along x, in CRS units.
    pub fn meters_per_pixel(&self) -> f64 {
        self.a.abs()
    }
}

/// A decoded raster ready to show: RGB pixels plus where they sit in the world.
pub struct DisplayRaster {
    pub image: RgbImage,
    pub extent: Extent,
    pub meters_per_pixel: f64,
}

impl DisplayRaster {
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let decoded = image::open(path).map_err(|source| RasterError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(RasterError::Empty {
                path: path.to_path_buf(),
            });
        }
        let color = decoded.color();
        if !color.has_color() {
            return Err(RasterError::MissingColorChannels {
                path: path.to_path_buf(),
                color,
            });
        }
        // picks red, green and blue by name; alpha and bit depth are dropped
        let image = decoded.to_rgb8();

        let georef = match ImageFormat::from_path(path) {
            Ok(ImageFormat::Tiff) => read_geotransform(path)?,
            _ => None,
        };
        let transform = georef.unwrap_or_else(|| {
            log::warn!(
                "{} is not georeferenced, using pixel coordinates",
                path.display()
            );
            GeoTransform::IDENTITY
        });

        log::debug!("geotransform {transform:?}");
        let extent = transform.extent(image.width(), image.height());
        let meters_per_pixel = transform.meters_per_pixel();
        log::info!(
            "Opened {} ({}x{}, {:.2} m/px)",
            path.display(),
            image.width(),
            image.height(),
            meters_per_pixel
        );
        Ok(Self {
            image,
            extent,
            meters_per_pixel,
        })
    }

    /// Pixels for the GPU, shrunk if either side exceeds `max_side`.
    /// Only the texture changes; the extent stays the same.
    pub fn display_pixels(&self, max_side: usize) -> Cow<'_, RgbImage> {
        let (w, h) = self.image.dimensions();
        let max_side = max_side.max(1) as u32;
        if w <= max_side && h <= max_side {
            return Cow::Borrowed(&self.image);
        }
        let scale = max_side as f64 / w.max(h) as f64;
        let nw = ((w as f64 * scale) as u32).max(1);
        let nh = ((h as f64 * scale) as u32).max(1);
        log::info!("Downsampling {w}x{h} raster to {nw}x{nh} for display");
        Cow::Owned(image::imageops::resize(
            &self.image,
            nw,
            nh,
            FilterType::Triangle,
        ))
    }
}

/// The affine transform stored in GeoTIFF tags, if any.
pub fn read_geotransform(path: &Path) -> Result<Option<GeoTransform>, RasterError> {
    let tag_err = |source| RasterError::GeoTags {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|source| RasterError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tag_err)?;

    let mut doubles = |tag| -> Result<Option<Vec<f64>>, RasterError> {
        decoder
            .find_tag(tag)
            .and_then(|value| value.map(|v| v.into_f64_vec()).transpose())
            .map_err(tag_err)
    };

    if let Some(matrix) = doubles(Tag::ModelTransformationTag)? {
        if let Some(transform) = GeoTransform::from_model_transformation(&matrix) {
            return Ok(Some(transform));
        }
    }
    let Some(scale) = doubles(Tag::ModelPixelScaleTag)? else {
        return Ok(None);
    };
    let tiepoint = doubles(Tag::ModelTiepointTag)?.unwrap_or_else(|| vec![0.0; 6]);
    Ok(GeoTransform::from_scale_and_tiepoint(&scale, &tiepoint))
}
