//! Drawing decoded signature rasters onto pages
//!
//! Pages reaching this module are unrotated (either originally or via
//! the flattener), so images are always drawn at rotation 0: the cm
//! matrix only scales and translates. JPEG bytes are embedded verbatim
//! behind DCTDecode; PNG is decoded to RGB8 with the alpha channel
//! carried as a grayscale SMask so transparent signature backgrounds
//! stay transparent.

use crate::error::SigMergeError;
use image::GenericImageView;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use pagegeom::Rect;
use tracing::debug;

/// A signature raster ready for embedding.
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    kind: ImageKind,
}

enum ImageKind {
    /// Original JPEG bytes, embedded with DCTDecode.
    Jpeg { data: Vec<u8>, grayscale: bool },
    /// Raw 8-bit RGB samples plus optional 8-bit alpha samples.
    Rgb {
        data: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
}

impl DecodedImage {
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Decode signature image bytes. Only PNG and JPEG are accepted.
pub fn decode_signature_image(bytes: &[u8]) -> Result<DecodedImage, SigMergeError> {
    let format = image::guess_format(bytes)
        .map_err(|e| SigMergeError::ImageDecodeError(e.to_string()))?;

    match format {
        image::ImageFormat::Jpeg => {
            let img = image::load_from_memory_with_format(bytes, format)
                .map_err(|e| SigMergeError::ImageDecodeError(e.to_string()))?;
            let (width, height) = img.dimensions();
            let grayscale = matches!(
                img.color(),
                image::ColorType::L8
                    | image::ColorType::L16
                    | image::ColorType::La8
                    | image::ColorType::La16
            );
            Ok(DecodedImage {
                width,
                height,
                kind: ImageKind::Jpeg {
                    data: bytes.to_vec(),
                    grayscale,
                },
            })
        }
        image::ImageFormat::Png => {
            let img = image::load_from_memory_with_format(bytes, format)
                .map_err(|e| SigMergeError::ImageDecodeError(e.to_string()))?;
            let (width, height) = img.dimensions();
            let rgba = img.to_rgba8();

            let mut data = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            let mut has_transparency = false;
            for pixel in rgba.pixels() {
                data.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
                if pixel.0[3] != 255 {
                    has_transparency = true;
                }
            }

            Ok(DecodedImage {
                width,
                height,
                kind: ImageKind::Rgb {
                    data,
                    alpha: has_transparency.then_some(alpha),
                },
            })
        }
        other => Err(SigMergeError::ImageDecodeError(format!(
            "unsupported image format {:?}, only PNG and JPEG are accepted",
            other
        ))),
    }
}

/// Embed the raster as an Image XObject and return its object id.
fn embed_image(doc: &mut Document, img: &DecodedImage) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "BitsPerComponent" => 8,
    };

    match &img.kind {
        ImageKind::Jpeg { data, grayscale } => {
            let colorspace = if *grayscale { "DeviceGray" } else { "DeviceRGB" };
            dict.set("ColorSpace", Object::Name(colorspace.as_bytes().to_vec()));
            dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            doc.add_object(Object::Stream(Stream::new(dict, data.clone())))
        }
        ImageKind::Rgb { data, alpha } => {
            dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
            if let Some(alpha) = alpha {
                let smask_dict = dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => img.width as i64,
                    "Height" => img.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                };
                let smask_id =
                    doc.add_object(Object::Stream(Stream::new(smask_dict, alpha.clone())));
                dict.set("SMask", Object::Reference(smask_id));
            }
            doc.add_object(Object::Stream(Stream::new(dict, data.clone())))
        }
    }
}

/// Draw a decoded signature image at `rect` (PDF content space,
/// bottom-left origin) on the given page. `index` keeps resource names
/// unique when several signatures land on one page.
pub fn place_signature(
    doc: &mut Document,
    page_id: ObjectId,
    rect: Rect,
    img: &DecodedImage,
    index: usize,
) -> Result<(), SigMergeError> {
    let xobject_id = embed_image(doc, img);
    let name = format!("Sig{}", index);
    register_xobject(doc, page_id, &name, xobject_id)?;

    let ops = format!(
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ",
        fmt(rect.width),
        fmt(rect.height),
        fmt(rect.x),
        fmt(rect.y),
        name
    );
    append_content(doc, page_id, ops.into_bytes())?;

    debug!(
        page_object = ?page_id,
        name, "drew signature at ({:.1}, {:.1}) {}x{}",
        rect.x, rect.y, rect.width, rect.height
    );
    Ok(())
}

fn fmt(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.4}", value)
    }
}

fn operation_error(e: impl ToString) -> SigMergeError {
    SigMergeError::ParseError(e.to_string())
}

/// Materialize the page's Resources (which may be inherited or shared
/// via a reference) as an inline dictionary on the page itself, then
/// register the XObject under `name`.
fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    xobject_id: ObjectId,
) -> Result<(), SigMergeError> {
    let mut resources = resolve_page_resources(doc, page_id);

    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(existing)) => existing.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    };
    xobjects.set(name.as_bytes(), Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page = doc
        .get_object_mut(page_id)
        .map_err(operation_error)?
        .as_dict_mut()
        .map_err(operation_error)?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// Find the effective Resources dictionary for a page, following a
/// direct reference or walking the Parent chain, resolved to a clone.
fn resolve_page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = page_id;
    for _ in 0..64 {
        let Some(dict) = doc.get_object(current).ok().and_then(|o| o.as_dict().ok()) else {
            return Dictionary::new();
        };
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(inline)) => return inline.clone(),
            Ok(Object::Reference(id)) => {
                return doc
                    .get_object(*id)
                    .ok()
                    .and_then(|obj| obj.as_dict().ok())
                    .cloned()
                    .unwrap_or_default();
            }
            _ => {}
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => current = *parent_id,
            _ => return Dictionary::new(),
        }
    }
    Dictionary::new()
}

/// Append a content stream to the page, preserving existing streams.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    ops: Vec<u8>,
) -> Result<(), SigMergeError> {
    let stream_id = doc.add_object(Object::Stream(Stream::new(Dictionary::new(), ops)));

    let existing = {
        let page = doc
            .get_object(page_id)
            .map_err(operation_error)?
            .as_dict()
            .map_err(operation_error)?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
            Ok(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        }
    };

    let mut contents = existing;
    contents.push(Object::Reference(stream_id));

    let page = doc
        .get_object_mut(page_id)
        .map_err(operation_error)?
        .as_dict_mut()
        .map_err(operation_error)?;
    page.set("Contents", Object::Array(contents));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, alpha]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Jpeg).unwrap();
        buffer.into_inner()
    }

    fn test_doc() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let content_id = doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            b"BT ET".to_vec(),
        )));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 1,
                "Kids" => vec![Object::Reference(page_id)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        (doc, page_id)
    }

    #[test]
    fn test_decode_png_dimensions() {
        let img = decode_signature_image(&png_bytes(40, 20, 255)).unwrap();
        assert_eq!(img.width, 40);
        assert_eq!(img.height, 20);
        assert!((img.aspect_ratio() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_opaque_png_has_no_smask() {
        let img = decode_signature_image(&png_bytes(4, 4, 255)).unwrap();
        match &img.kind {
            ImageKind::Rgb { alpha, .. } => assert!(alpha.is_none()),
            _ => panic!("PNG should decode to raw RGB"),
        }
    }

    #[test]
    fn test_decode_transparent_png_keeps_alpha() {
        let img = decode_signature_image(&png_bytes(4, 4, 128)).unwrap();
        match &img.kind {
            ImageKind::Rgb { alpha, .. } => {
                let alpha = alpha.as_ref().expect("alpha channel preserved");
                assert_eq!(alpha.len(), 16);
                assert!(alpha.iter().all(|&a| a == 128));
            }
            _ => panic!("PNG should decode to raw RGB"),
        }
    }

    #[test]
    fn test_decode_jpeg_passthrough() {
        let bytes = jpeg_bytes(8, 4);
        let img = decode_signature_image(&bytes).unwrap();
        assert_eq!(img.width, 8);
        assert_eq!(img.height, 4);
        match &img.kind {
            ImageKind::Jpeg { data, .. } => assert_eq!(data, &bytes),
            _ => panic!("JPEG should be embedded verbatim"),
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_signature_image(b"definitely not an image");
        assert!(matches!(result, Err(SigMergeError::ImageDecodeError(_))));
    }

    #[test]
    fn test_decode_unsupported_format_fails() {
        // A valid GIF header: decodable by `image`, but not PNG/JPEG
        let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
        let result = decode_signature_image(gif);
        assert!(matches!(result, Err(SigMergeError::ImageDecodeError(_))));
    }

    #[test]
    fn test_place_registers_xobject_and_content() {
        let (mut doc, page_id) = test_doc();
        let img = decode_signature_image(&png_bytes(40, 20, 255)).unwrap();
        place_signature(
            &mut doc,
            page_id,
            Rect {
                x: 100.0,
                y: 67.0,
                width: 150.0,
                height: 75.0,
            },
            &img,
            0,
        )
        .unwrap();

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Sig0").is_ok());

        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 2);

        // The drawing ops reference the image at the requested box
        let stream_id = contents[1].as_reference().unwrap();
        let stream = match doc.get_object(stream_id).unwrap() {
            Object::Stream(s) => s,
            _ => panic!("appended content should be a stream"),
        };
        let ops = String::from_utf8_lossy(&stream.content);
        assert!(ops.contains("/Sig0 Do"));
        assert!(ops.contains("150 0 0 75 100 67 cm"));
    }

    #[test]
    fn test_multiple_signatures_get_unique_names() {
        let (mut doc, page_id) = test_doc();
        let img = decode_signature_image(&png_bytes(10, 10, 255)).unwrap();
        for i in 0..2 {
            place_signature(
                &mut doc,
                page_id,
                Rect {
                    x: 50.0 + 200.0 * i as f64,
                    y: 50.0,
                    width: 100.0,
                    height: 50.0,
                },
                &img,
                i,
            )
            .unwrap();
        }

        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Sig0").is_ok());
        assert!(xobjects.get(b"Sig1").is_ok());
    }

    #[test]
    fn test_placed_document_still_parses() {
        let (mut doc, page_id) = test_doc();
        let img = decode_signature_image(&jpeg_bytes(30, 15)).unwrap();
        place_signature(
            &mut doc,
            page_id,
            Rect {
                x: 10.0,
                y: 10.0,
                width: 60.0,
                height: 30.0,
            },
            &img,
            0,
        )
        .unwrap();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        assert!(Document::load_mem(&bytes).is_ok());
    }
}
