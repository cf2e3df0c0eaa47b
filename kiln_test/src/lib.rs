use std::{
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use kiln_shared::log;

/// Folder to which the tests write files that are interesting when debugging a failing test.
pub const TEST_RESULT_FOLDER: &str = "test_results";

static LOGGER: Once = Once::new();

/// Installs a logger for the tests. Can be called from every test because only the first call has an effect.
pub fn setup_logger() {
    LOGGER.call_once(|| {
        simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Trace)
            .init()
            .expect("failed to initialize the logger");
    });
}

/// Creates a folder in the [`TEST_RESULT_FOLDER`] that is named after the given function name.
pub fn create_test_result_folder_for_function(function_name: &str) -> PathBuf {
    let folder_name = function_name.replace("::", ".");
    let path = PathBuf::from(TEST_RESULT_FOLDER).join(folder_name);
    if path.exists() {
        fs::remove_dir_all(&path).unwrap_or_else(|_| panic!("Failed to clear the test result folder \"{}\"", path.display()));
    }
    fs::create_dir_all(&path).unwrap_or_else(|_| panic!("Failed to create the test result folder \"{}\"", path.display()));
    println!("The files for debugging this test will be written to the following folder: {}", path.display());
    path
}

/// Writes a small gradient image with the given number of channels. The format is determined by the extension of `path`.
pub fn write_test_image(path: impl AsRef<Path>, channel_count: u8) {
    const SIZE: u32 = 4;
    let value = |x: u32, y: u32| ((x + y * SIZE) * 255 / (SIZE * SIZE)) as u8;
    let image = match channel_count {
        1 => DynamicImage::ImageLuma8(GrayImage::from_fn(SIZE, SIZE, |x, y| image::Luma([value(x, y)]))),
        2 => DynamicImage::ImageLumaA8(GrayAlphaImage::from_fn(SIZE, SIZE, |x, y| image::LumaA([value(x, y), 255]))),
        3 => DynamicImage::ImageRgb8(RgbImage::from_fn(SIZE, SIZE, |x, y| image::Rgb([value(x, y), 0, 255]))),
        4 => DynamicImage::ImageRgba8(RgbaImage::from_fn(SIZE, SIZE, |x, y| image::Rgba([value(x, y), 0, 255, 128]))),
        _ => panic!("Test images support 1 to 4 channels but {channel_count} were requested"),
    };
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent).expect("Failed to create the parent folder of the test image");
    }
    image
        .save(&path)
        .unwrap_or_else(|_| panic!("Failed to save test image to path \"{}\"", path.as_ref().to_string_lossy()));
}
