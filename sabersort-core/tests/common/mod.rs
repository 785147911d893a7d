//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use sabersort_core::{Candidate, HashAlgorithm, Origin, PerceptualHasher};

/// Which half of a two-tone test image is dark.
///
/// At an 8x8 average hash, `Left` and `Right` differ in all 64 bits and
/// `Left` and `Top` in exactly 32.
#[derive(Debug, Clone, Copy)]
pub enum Dark {
    Left,
    Right,
    Top,
}

pub fn image(dark: Dark, size: u32) -> DynamicImage {
    let half = size / 2;
    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let is_dark = match dark {
            Dark::Left => x < half,
            Dark::Right => x >= half,
            Dark::Top => y < half,
        };
        if is_dark {
            Rgb([0u8, 0, 0])
        } else {
            Rgb([255u8, 255, 255])
        }
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format).expect("encoding failed");
    buffer.into_inner()
}

pub fn png(dark: Dark) -> Vec<u8> {
    encode(&image(dark, 64), ImageFormat::Png)
}

/// Larger rendition standing in for a full-resolution original.
pub fn png_large(dark: Dark) -> Vec<u8> {
    encode(&image(dark, 256), ImageFormat::Png)
}

pub fn hasher() -> PerceptualHasher {
    PerceptualHasher::new(HashAlgorithm::Average, 8)
}

pub fn candidate(origin: Origin, id: &str) -> Candidate {
    Candidate {
        origin,
        post_link: format!("https://{origin}.example.com/posts/{id}"),
        thumbnail_link: format!("https://search.example.com/thumbnail/{id}.jpg"),
        width: 256,
        height: 256,
        file_size: 4096,
        extension: "jpg".to_string(),
        title: format!("title {id}"),
        author: "artist".to_string(),
        author_id: "1001".to_string(),
        author_link: format!("https://{origin}.example.com/users/1001"),
        id: id.to_string(),
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
