//! Image inputs: each frame becomes one opaque PDF page.
//!
//! Frames are decoded with `image`, flattened onto white (PDF pages have no
//! alpha), deflated, and placed as a full-page `DeviceRGB` XObject with
//! `lopdf`. Page size follows the pixel size at the configured DPI, so a scan
//! keeps its physical dimensions.
//!
//! GIFs go through the animation decoder and yield one page per frame in
//! file order; every other format (APNG included) yields exactly one page.
//! A GIF that would expand past [`MAX_GIF_FRAMES`] or [`MAX_DECODED_BYTES`]
//! is refused as a decode failure.

use crate::error::{ConversionError, ConversionPhase};
use crate::format::extension_of;
use crate::pipeline::write_atomically;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::gif::GifDecoder;
use image::{
    AnimationDecoder, DynamicImage, ImageDecoder, ImageFormat, Limits, RgbImage, RgbaImage,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::{BufReader, Write};
use std::path::Path;
use tracing::debug;

/// Convert the image at `source` into a PDF at `dest`; returns the page count.
pub fn rasterize(source: &Path, dest: &Path, dpi: u32) -> Result<usize, ConversionError> {
    let frames = decode_frames(source)?;
    debug!("Decoded {} frame(s) from {}", frames.len(), source.display());

    let bytes = frames_to_pdf(&frames, dpi).map_err(|detail| ConversionError::DecodeFailure {
        phase: ConversionPhase::ImageEncode,
        path: source.to_path_buf(),
        detail,
    })?;
    write_atomically(dest, &bytes)?;
    Ok(frames.len())
}

/// Decode every frame of `source` as opaque RGB.
pub fn decode_frames(source: &Path) -> Result<Vec<RgbImage>, ConversionError> {
    let decode_err = |detail: String| ConversionError::DecodeFailure {
        phase: ConversionPhase::ImageDecode,
        path: source.to_path_buf(),
        detail,
    };

    let file = std::fs::File::open(source)
        .map_err(|e| ConversionError::io(ConversionPhase::ImageDecode, source, e))?;
    let reader = BufReader::new(file);

    let ext = extension_of(source);
    if ext == "gif" {
        let mut decoder = GifDecoder::new(reader).map_err(|e| decode_err(e.to_string()))?;
        decoder
            .set_limits(Limits::default())
            .map_err(|e| decode_err(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let mut budget = FrameBudget::new(width, height).map_err(decode_err)?;

        let mut frames = Vec::new();
        for frame in decoder.into_frames() {
            budget.admit().map_err(decode_err)?;
            let frame = frame.map_err(|e| decode_err(e.to_string()))?;
            frames.push(flatten_onto_white(&frame.into_buffer()));
        }
        if frames.is_empty() {
            return Err(decode_err("GIF contains no frames".into()));
        }
        return Ok(frames);
    }

    let format = ImageFormat::from_extension(&ext)
        .ok_or_else(|| decode_err(format!("no image decoder for '.{ext}'")))?;
    let image = image::ImageReader::with_format(reader, format)
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;
    Ok(vec![to_opaque_rgb(image)])
}

/// Most frames a single GIF may expand into.
pub const MAX_GIF_FRAMES: usize = 500;

/// Decoded bytes allowed across all frames of one image; matches `image`'s
/// default allocation limit.
pub const MAX_DECODED_BYTES: u64 = 512 * 1024 * 1024;

/// Running cost of the frames decoded so far. Every GIF frame is composited
/// onto the full logical screen, so each one costs the whole canvas.
struct FrameBudget {
    frame_bytes: u64,
    frames: usize,
    spent: u64,
}

impl FrameBudget {
    fn new(width: u32, height: u32) -> Result<Self, String> {
        // The RGBA canvas plus one opaque copy must fit.
        let pixels = width as u64 * height as u64;
        if pixels * 4 + pixels * 3 > MAX_DECODED_BYTES {
            return Err(format!(
                "GIF canvas {width}x{height} exceeds the {} MiB decode limit",
                MAX_DECODED_BYTES / (1024 * 1024)
            ));
        }
        Ok(Self {
            frame_bytes: pixels * 3,
            frames: 0,
            spent: pixels * 4,
        })
    }

    fn admit(&mut self) -> Result<(), String> {
        self.frames += 1;
        self.spent += self.frame_bytes;
        if self.frames > MAX_GIF_FRAMES {
            return Err(format!("GIF has more than {MAX_GIF_FRAMES} frames"));
        }
        if self.spent > MAX_DECODED_BYTES {
            return Err(format!(
                "GIF frames exceed the {} MiB decode limit after {} frame(s)",
                MAX_DECODED_BYTES / (1024 * 1024),
                self.frames - 1
            ));
        }
        Ok(())
    }
}

fn to_opaque_rgb(image: DynamicImage) -> RgbImage {
    if image.color().has_alpha() {
        flatten_onto_white(&image.to_rgba8())
    } else {
        image.to_rgb8()
    }
}

/// Composite `rgba` over an opaque white background.
///
/// Fully transparent pixels become pure white whatever their stored colour.
pub fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

/// Page edge in points for `px` pixels at `dpi`; never zero.
pub fn pixels_to_points(px: u32, dpi: u32) -> i64 {
    let pts = (px as f64 * 72.0 / dpi.max(1) as f64).round() as i64;
    pts.max(1)
}

/// Assemble one page per frame. Errors are returned as plain text for the caller to wrap.
fn frames_to_pdf(frames: &[RgbImage], dpi: u32) -> Result<Vec<u8>, String> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(frames.len());

    for frame in frames {
        let (w_px, h_px) = frame.dimensions();
        let w_pt = pixels_to_points(w_px, dpi);
        let h_pt = pixels_to_points(h_px, dpi);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(frame.as_raw())
            .map_err(|e| e.to_string())?;
        let compressed = encoder.finish().map_err(|e| e.to_string())?;

        let mut image_stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w_px as i64,
                "Height" => h_px as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            compressed,
        );
        image_stream.allows_compression = false;
        let image_id = doc.add_object(image_stream);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w_pt.into(), 0.into(), 0.into(), h_pt.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().map_err(|e| e.to_string())?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w_pt.into(), h_pt.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).map_err(|e| e.to_string())?;
    Ok(buf)
}
