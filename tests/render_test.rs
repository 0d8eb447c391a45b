//! End-to-end rendering tests over synthetic documents.

mod common;

use repdf::{
    load_bytes, render_document, render_page, Error, ImageFormat, RenderOptions, Repdf,
};

fn png_options() -> RenderOptions {
    RenderOptions::new().with_format(ImageFormat::Png)
}

#[test]
fn test_solid_fill_round_trips_through_png() {
    let pdf = common::solid_fill_pdf(1.0, 0.0, 0.0);
    let doc = load_bytes(&pdf).unwrap();

    let page = render_page(&doc, 0, &png_options().with_max_edge_size(200)).unwrap();
    assert_eq!(page.format, ImageFormat::Png);

    let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
    assert_eq!(decoded.width(), page.width);
    assert_eq!(decoded.height(), page.height);
    let center = decoded.get_pixel(page.width / 2, page.height / 2);
    assert_eq!(center.0, [255, 0, 0]);
}

#[test]
fn test_native_size_renders_at_reference_dpi() {
    // 612x792pt at 150 DPI.
    let pdf = common::solid_fill_pdf(0.0, 0.0, 1.0);
    let doc = load_bytes(&pdf).unwrap();

    let page = render_page(&doc, 0, &png_options()).unwrap();
    assert_eq!((page.width, page.height), (1275, 1650));
}

#[test]
fn test_max_edge_caps_the_longer_edge_exactly() {
    let pdf = common::multi_page_pdf(3);
    let doc = load_bytes(&pdf).unwrap();
    assert_eq!(doc.page_count(), 3);

    let options = png_options().with_max_edge_size(1024);
    let output = render_document(&doc, &options);
    assert!(output.is_complete());
    assert_eq!(output.pages.len(), 3);

    for page in &output.pages {
        assert_eq!(page.height, 1024);
        assert_eq!(page.width, (612.0f32 * 1024.0 / 792.0).round() as u32);
    }
}

#[test]
fn test_pages_come_back_in_page_order() {
    let pdf = common::multi_page_pdf(4);
    let doc = load_bytes(&pdf).unwrap();

    let output = render_document(&doc, &png_options().with_max_edge_size(64));
    let indices: Vec<usize> = output.pages.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_sequential_matches_parallel() {
    let pdf = common::multi_page_pdf(3);
    let doc = load_bytes(&pdf).unwrap();

    let parallel = render_document(&doc, &png_options().with_max_edge_size(128));
    let sequential = render_document(&doc, &png_options().with_max_edge_size(128).sequential());

    assert_eq!(parallel.pages.len(), sequential.pages.len());
    for (a, b) in parallel.pages.iter().zip(&sequential.pages) {
        assert_eq!(a.data, b.data);
    }
}

#[test]
fn test_out_of_range_page_index() {
    let pdf = common::solid_fill_pdf(0.5, 0.5, 0.5);
    let doc = load_bytes(&pdf).unwrap();

    let result = render_page(&doc, 5, &png_options());
    assert!(matches!(result, Err(Error::PageOutOfRange(5, 1))));
}

#[test]
fn test_broken_page_fails_alone() {
    let pdf = common::pdf_with_broken_middle_page();
    let doc = load_bytes(&pdf).unwrap();

    let output = render_document(&doc, &png_options().with_max_edge_size(64));
    assert_eq!(output.pages.len(), 2);
    assert_eq!(output.failures.len(), 1);
    assert!(!output.is_complete());

    let failure = &output.failures[0];
    assert_eq!(failure.index, 1);
    assert!(matches!(failure.error, Error::RenderFailure { page: 1, .. }));

    let rendered: Vec<usize> = output.pages.iter().map(|p| p.index).collect();
    assert_eq!(rendered, vec![0, 2]);
}

#[test]
fn test_embedded_image_paints_the_page() {
    let pdf = common::pdf_with_image(common::flate_image(8, 8, 0, 160, 0));
    let doc = load_bytes(&pdf).unwrap();

    let page = render_page(&doc, 0, &png_options().with_max_edge_size(100)).unwrap();
    let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
    let center = decoded.get_pixel(page.width / 2, page.height / 2);
    assert_eq!(center.0, [0, 160, 0]);
}

#[test]
fn test_jpeg_output_is_close_to_the_fill_color() {
    let pdf = common::solid_fill_pdf(1.0, 0.0, 0.0);
    let doc = load_bytes(&pdf).unwrap();

    let options = RenderOptions::new()
        .with_format(ImageFormat::Jpeg)
        .with_quality(90)
        .with_max_edge_size(200);
    let page = render_page(&doc, 0, &options).unwrap();

    let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
    let center = decoded.get_pixel(page.width / 2, page.height / 2);
    assert!(center.0[0] > 230, "red channel {} too low", center.0[0]);
    assert!(center.0[1] < 40 && center.0[2] < 40);
}

#[test]
fn test_webp_output_carries_the_riff_magic() {
    let pdf = common::solid_fill_pdf(0.0, 0.0, 0.0);
    let doc = load_bytes(&pdf).unwrap();

    let options = RenderOptions::new().with_max_edge_size(64);
    let page = render_page(&doc, 0, &options).unwrap();
    assert_eq!(&page.data[0..4], b"RIFF");
    assert_eq!(&page.data[8..12], b"WEBP");
}

#[test]
fn test_builder_renders_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("solid.pdf");
    std::fs::write(&path, common::solid_fill_pdf(0.0, 1.0, 0.0)).unwrap();

    let output = Repdf::new()
        .with_format(ImageFormat::Png)
        .with_max_edge_size(128)
        .render(&path)
        .unwrap();
    assert!(output.is_complete());
    assert_eq!(output.pages.len(), 1);
    assert_eq!(output.pages[0].height, 128);
}

#[test]
fn test_empty_content_renders_white() {
    let mut builder = common::PdfBuilder::new();
    builder.add_page(common::LETTER, b"");
    let pdf = builder.build();

    let doc = load_bytes(&pdf).unwrap();
    let page = render_page(&doc, 0, &png_options().with_max_edge_size(32)).unwrap();
    let decoded = image::load_from_memory(&page.data).unwrap().to_rgb8();
    assert!(decoded.pixels().all(|p| p.0 == [255, 255, 255]));
}
