//! Shared builders for synthetic test documents.
//!
//! Every test file assembles in-memory PDFs through the crate's own
//! serializer rather than carrying binary fixtures, so the inputs stay
//! readable next to the assertions that use them.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use repdf::compress::writer;
use repdf::object::{Dict, Object, ObjectId, Stream};
use repdf::PdfVersion;

/// US Letter in points.
pub const LETTER: [i64; 4] = [0, 0, 612, 792];

pub struct PdfBuilder {
    objects: BTreeMap<ObjectId, Object>,
    page_ids: Vec<ObjectId>,
    next_num: u32,
}

impl PdfBuilder {
    pub fn new() -> Self {
        PdfBuilder {
            objects: BTreeMap::new(),
            page_ids: Vec::new(),
            // 1 is the catalog, 2 the page tree root.
            next_num: 3,
        }
    }

    fn alloc(&mut self) -> ObjectId {
        let id = (self.next_num, 0);
        self.next_num += 1;
        id
    }

    pub fn add_object(&mut self, object: Object) -> ObjectId {
        let id = self.alloc();
        self.objects.insert(id, object);
        id
    }

    /// Append a page with the given raw content stream and no resources.
    pub fn add_page(&mut self, media_box: [i64; 4], content: &[u8]) -> ObjectId {
        self.add_page_with(media_box, content, None, Dict::new())
    }

    /// Append a page, optionally with an explicit content filter and a
    /// resource dictionary.
    pub fn add_page_with(
        &mut self,
        media_box: [i64; 4],
        content: &[u8],
        filter: Option<&str>,
        resources: Dict,
    ) -> ObjectId {
        let mut stream_dict = Dict::new();
        if let Some(name) = filter {
            stream_dict.set("Filter", Object::Name(name.into()));
        }
        let content_id = self.add_object(Object::Stream(Stream::new(
            stream_dict,
            content.to_vec(),
        )));

        let mut page = Dict::new();
        page.set("Type", Object::Name("Page".into()));
        page.set("Parent", Object::Reference((2, 0)));
        page.set(
            "MediaBox",
            Object::Array(media_box.iter().map(|&v| Object::Integer(v)).collect()),
        );
        page.set("Contents", Object::Reference(content_id));
        if !resources.is_empty() {
            page.set("Resources", Object::Dict(resources));
        }
        let id = self.add_object(Object::Dict(page));
        self.page_ids.push(id);
        id
    }

    pub fn build(self) -> Vec<u8> {
        self.build_inner(None)
    }

    /// Build with an /Info dictionary wired into the trailer.
    pub fn build_with_info(self, info: Dict) -> Vec<u8> {
        self.build_inner(Some(info))
    }

    fn build_inner(mut self, info: Option<Dict>) -> Vec<u8> {
        let mut catalog = Dict::new();
        catalog.set("Type", Object::Name("Catalog".into()));
        catalog.set("Pages", Object::Reference((2, 0)));
        self.objects.insert((1, 0), Object::Dict(catalog));

        let mut pages = Dict::new();
        pages.set("Type", Object::Name("Pages".into()));
        pages.set(
            "Kids",
            Object::Array(self.page_ids.iter().map(|&id| Object::Reference(id)).collect()),
        );
        pages.set("Count", Object::Integer(self.page_ids.len() as i64));
        self.objects.insert((2, 0), Object::Dict(pages));

        let mut trailer = Dict::new();
        trailer.set("Root", Object::Reference((1, 0)));
        if let Some(info) = info {
            let info_id = self.alloc();
            self.objects.insert(info_id, Object::Dict(info));
            trailer.set("Info", Object::Reference(info_id));
        }
        writer::serialize(PdfVersion::default(), &self.objects, &trailer)
    }
}

/// A one-page letter document filled edge to edge with one RGB color.
pub fn solid_fill_pdf(r: f32, g: f32, b: f32) -> Vec<u8> {
    let content = format!("{r} {g} {b} rg 0 0 612 792 re f");
    let mut builder = PdfBuilder::new();
    builder.add_page(LETTER, content.as_bytes());
    builder.build()
}

/// `count` letter pages, each filled with a distinct gray level.
pub fn multi_page_pdf(count: usize) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    for i in 0..count {
        let level = i as f32 / count.max(1) as f32;
        let content = format!("{level} g 0 0 612 792 re f");
        builder.add_page(LETTER, content.as_bytes());
    }
    builder.build()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A Flate-compressed DeviceRGB image XObject of the given size with
/// every sample set to `(r, g, b)`.
pub fn flate_image(width: u32, height: u32, r: u8, g: u8, b: u8) -> Object {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..width * height {
        samples.extend_from_slice(&[r, g, b]);
    }
    let mut dict = Dict::new();
    dict.set("Type", Object::Name("XObject".into()));
    dict.set("Subtype", Object::Name("Image".into()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name("DeviceRGB".into()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name("FlateDecode".into()));
    Object::Stream(Stream::new(dict, deflate(&samples)))
}

/// A DCTDecode (JPEG) DeviceRGB image XObject with a horizontal
/// gradient, encoded at the given JPEG quality.
pub fn jpeg_image(width: u32, height: u32, jpeg_quality: u8) -> Object {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let level = (x * 255 / width.max(1)) as u8;
            samples.extend_from_slice(&[level, (y % 256) as u8, 128]);
        }
    }
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, jpeg_quality)
        .encode(&samples, width, height, image::ExtendedColorType::Rgb8)
        .unwrap();

    let mut dict = Dict::new();
    dict.set("Type", Object::Name("XObject".into()));
    dict.set("Subtype", Object::Name("Image".into()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name("DeviceRGB".into()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name("DCTDecode".into()));
    Object::Stream(Stream::new(dict, encoded))
}

/// An unfiltered image whose samples do not deflate well.
pub fn noisy_raw_image(width: u32, height: u32) -> Object {
    let mut samples = Vec::with_capacity((width * height * 3) as usize);
    let mut state: u32 = 0x2545_f491;
    for _ in 0..width * height * 3 {
        // xorshift; anything non-repeating defeats the deflater.
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        samples.push((state & 0xff) as u8);
    }
    let mut dict = Dict::new();
    dict.set("Type", Object::Name("XObject".into()));
    dict.set("Subtype", Object::Name("Image".into()));
    dict.set("Width", Object::Integer(width as i64));
    dict.set("Height", Object::Integer(height as i64));
    dict.set("ColorSpace", Object::Name("DeviceRGB".into()));
    dict.set("BitsPerComponent", Object::Integer(8));
    Object::Stream(Stream::new(dict, samples))
}

/// A one-page document whose page is covered by the given image XObject.
pub fn pdf_with_image(image: Object) -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    let image_id = builder.add_object(image);

    let mut xobjects = Dict::new();
    xobjects.set("Im0", Object::Reference(image_id));
    let mut resources = Dict::new();
    resources.set("XObject", Object::Dict(xobjects));

    builder.add_page_with(
        LETTER,
        b"q 612 0 0 792 0 0 cm /Im0 Do Q",
        None,
        resources,
    );
    builder.build()
}

/// Three pages where the middle one declares FlateDecode over garbage,
/// so its content stream cannot be decoded.
pub fn pdf_with_broken_middle_page() -> Vec<u8> {
    let mut builder = PdfBuilder::new();
    builder.add_page(LETTER, b"0.2 g 0 0 612 792 re f");
    builder.add_page_with(
        LETTER,
        b"this is not zlib data",
        Some("FlateDecode"),
        Dict::new(),
    );
    builder.add_page(LETTER, b"0.8 g 0 0 612 792 re f");
    builder.build()
}
