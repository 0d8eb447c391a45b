//! End-to-end recompression tests over synthetic documents.

mod common;

use repdf::{
    compress_bytes, compress_document_with_stats, load_bytes, render_page, CompressOptions,
    ImageFormat, RenderOptions, Repdf,
};

#[test]
fn test_flate_image_shrinks_and_output_reloads() {
    let pdf = common::pdf_with_image(common::flate_image(64, 64, 10, 20, 30));
    let doc = load_bytes(&pdf).unwrap();

    let (out, stats) = compress_document_with_stats(&doc, &CompressOptions::new()).unwrap();
    assert_eq!(stats.images_seen, 1);
    assert_eq!(stats.images_recompressed + stats.images_kept, 1);
    assert_eq!(stats.bytes_in, pdf.len() as u64);
    assert_eq!(stats.bytes_out, out.len() as u64);

    let reloaded = load_bytes(&out).unwrap();
    assert_eq!(reloaded.page_count(), 1);
}

#[test]
fn test_jpeg_recompression_preserves_the_rendered_picture() {
    // High-quality JPEG in, low quality out: the file must shrink and the
    // page must still render to roughly the same pixels.
    let pdf = common::pdf_with_image(common::jpeg_image(64, 64, 95));
    let doc = load_bytes(&pdf).unwrap();

    let (out, stats) =
        compress_document_with_stats(&doc, &CompressOptions::new().with_quality(20)).unwrap();
    assert_eq!(stats.images_recompressed, 1);
    assert!(out.len() < pdf.len());

    let options = RenderOptions::new()
        .with_format(ImageFormat::Png)
        .with_max_edge_size(64);
    let before = render_page(&doc, 0, &options).unwrap();
    let after = render_page(&load_bytes(&out).unwrap(), 0, &options).unwrap();
    assert_eq!((before.width, before.height), (after.width, after.height));

    let a = image::load_from_memory(&before.data).unwrap().to_rgb8();
    let b = image::load_from_memory(&after.data).unwrap().to_rgb8();
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            pa.0.iter()
                .zip(pb.0)
                .map(|(&x, y)| (x as i64 - y as i64).unsigned_abs())
                .sum::<u64>()
        })
        .sum();
    let mean = total as f64 / (a.width() * a.height() * 3) as f64;
    assert!(mean < 24.0, "mean channel error {mean} too high");
}

#[test]
fn test_incompressible_image_is_kept() {
    let image = common::noisy_raw_image(32, 32);
    let original_len = image.as_stream().unwrap().data.len();
    let pdf = common::pdf_with_image(image);
    let doc = load_bytes(&pdf).unwrap();

    let (out, stats) = compress_document_with_stats(&doc, &CompressOptions::new()).unwrap();
    assert_eq!(stats.images_seen, 1);
    assert_eq!(stats.images_kept, 1);
    assert_eq!(stats.images_recompressed, 0);

    let summaries = repdf::compress::scan_images(&load_bytes(&out).unwrap()).unwrap();
    assert_eq!(summaries[0].encoded_len, original_len);
}

#[test]
fn test_second_pass_never_grows() {
    let pdf = common::pdf_with_image(common::jpeg_image(48, 48, 90));
    let options = CompressOptions::new().with_quality(40);

    let first = compress_bytes(&pdf, &options).unwrap();
    let second = compress_bytes(&first, &options).unwrap();
    assert!(second.len() <= first.len());

    // Repeated passes must leave the document structure alone: same
    // page count, same page geometry.
    let doc_first = load_bytes(&first).unwrap();
    let doc_second = load_bytes(&second).unwrap();
    assert_eq!(doc_first.page_count(), doc_second.page_count());
    for (a, b) in doc_first.pages().iter().zip(doc_second.pages()) {
        assert_eq!(a.size_points(), b.size_points());
    }
}

#[test]
fn test_document_without_images_round_trips() {
    let pdf = common::solid_fill_pdf(0.3, 0.6, 0.9);
    let out = compress_bytes(&pdf, &CompressOptions::new()).unwrap();

    let doc = load_bytes(&out).unwrap();
    assert_eq!(doc.page_count(), 1);

    let options = RenderOptions::new()
        .with_format(ImageFormat::Png)
        .with_max_edge_size(32);
    let page = render_page(&doc, 0, &options).unwrap();
    let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
    let center = decoded.get_pixel(16, 16);
    // 0.3/0.6/0.9 of 255, within rounding.
    assert!((center.0[0] as i32 - 77).abs() <= 1);
    assert!((center.0[1] as i32 - 153).abs() <= 1);
    assert!((center.0[2] as i32 - 230).abs() <= 1);
}

#[test]
fn test_scan_images_reports_geometry() {
    let pdf = common::pdf_with_image(common::flate_image(24, 16, 0, 0, 0));
    let doc = load_bytes(&pdf).unwrap();

    let summaries = repdf::compress::scan_images(&doc).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!((summaries[0].width, summaries[0].height), (24, 16));
    assert_eq!(summaries[0].color_space, "DeviceRGB");
    assert_eq!(summaries[0].bits_per_component, 8);
    assert_eq!(summaries[0].filter.as_deref(), Some("FlateDecode"));
}

#[test]
fn test_builder_compresses_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.pdf");
    std::fs::write(&path, common::pdf_with_image(common::flate_image(32, 32, 5, 5, 5))).unwrap();

    let out = Repdf::new().with_quality(50).compress(&path).unwrap();
    assert!(repdf::is_pdf_bytes(&out));
    assert_eq!(load_bytes(&out).unwrap().page_count(), 1);
}

#[test]
fn test_metadata_survives_recompression() {
    let pdf = {
        use repdf::object::{Dict, Object};
        let mut builder = common::PdfBuilder::new();
        builder.add_page(common::LETTER, b"0 0 612 792 re f");
        let mut info = Dict::new();
        info.set("Title", Object::String(b"Quarterly Report".to_vec()));
        info.set("Author", Object::String(b"QA".to_vec()));
        builder.build_with_info(info)
    };

    let doc = load_bytes(&pdf).unwrap();
    assert_eq!(doc.info().title.as_deref(), Some("Quarterly Report"));

    let out = compress_bytes(&pdf, &CompressOptions::new()).unwrap();
    let reloaded = load_bytes(&out).unwrap();
    assert_eq!(reloaded.info().title.as_deref(), Some("Quarterly Report"));
    assert_eq!(reloaded.info().author.as_deref(), Some("QA"));
}
