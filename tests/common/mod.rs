//! Common test utilities

#![allow(dead_code)]

use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

/// Generate a test image with a solid color and a subtle gradient
pub fn generate_test_image(width: u32, height: u32, base_color: [u8; 4]) -> RgbaImage {
    let mut img = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = base_color[0].saturating_add((x % 50) as u8);
        let g = base_color[1].saturating_add((y % 50) as u8);
        *pixel = Rgba([r, g, base_color[2], base_color[3]]);
    }

    img
}

/// Save a test image as JPEG
pub fn save_jpeg<P: AsRef<Path>>(img: &RgbaImage, path: P, quality: u8) -> std::io::Result<()> {
    // Convert RGBA to RGB for JPEG
    let rgb_img: image::RgbImage = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();

    let file = std::fs::File::create(path)?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
    encoder
        .encode_image(&rgb_img)
        .map_err(std::io::Error::other)?;

    Ok(())
}

/// Write small JPEG photos with the given names into `dir`
pub fn write_photos(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let path = dir.join(name);
            let img = generate_test_image(64, 48, [((i * 40) % 200) as u8, 100, 150, 255]);
            save_jpeg(&img, &path, 85).unwrap();
            path
        })
        .collect()
}

/// Behaviour of the fake ffmpeg
pub enum FakeFfmpeg {
    /// Report progress, write the output file and exit 0
    Success,
    /// Print an error and exit 1
    Failure,
    /// Report one progress line and block until killed
    Hang,
}

/// Stand-in ffmpeg/ffprobe executables living in their own directory.
///
/// The fake ffmpeg records its arguments in `ffmpeg_args.txt`, copies any filter script to
/// `script_seen.txt` and writes `output_existed.txt` when the destination was already there.
/// The fake ffprobe prints the contents of `<track>.duration`.
#[cfg(unix)]
pub struct FakeTools {
    pub dir: tempfile::TempDir,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

#[cfg(unix)]
impl FakeTools {
    pub fn new(behaviour: FakeFfmpeg) -> Self {
        let dir = tempfile::TempDir::new().unwrap();

        let body = match behaviour {
            FakeFfmpeg::Success => {
                "printf 'frame=10 time=00:00:03.00 bitrate=1k\\r' >&2\n\
                 printf 'frame=20 time=00:00:06.00 bitrate=1k\\r' >&2\n\
                 printf 'mp4' > \"$last\"\n\
                 exit 0\n"
            }
            FakeFfmpeg::Failure => {
                "echo \"[AVFilterGraph @ 0x1] No such filter: 'xfadee'\" >&2\n\
                 exit 1\n"
            }
            FakeFfmpeg::Hang => {
                "printf 'frame=1 time=00:00:01.00 bitrate=1k\\r' >&2\n\
                 exec sleep 30\n"
            }
        };

        let ffmpeg_script = format!(
            "#!/bin/sh\n\
             dir=\"{dir}\"\n\
             printf '%s\\n' \"$@\" > \"$dir/ffmpeg_args.txt\"\n\
             prev=\"\"\n\
             for a in \"$@\"; do\n\
               if [ \"$prev\" = \"-filter_complex_script\" ]; then cp \"$a\" \"$dir/script_seen.txt\"; fi\n\
               prev=\"$a\"\n\
             done\n\
             last=\"$prev\"\n\
             if [ -e \"$last\" ]; then echo present > \"$dir/output_existed.txt\"; fi\n\
             {body}",
            dir = dir.path().display(),
            body = body
        );
        let ffprobe_script = format!(
            "#!/bin/sh\n\
             for last; do :; done\n\
             echo \"$last\" >> \"{dir}/ffprobe_calls.txt\"\n\
             if [ -f \"$last.delay\" ]; then sleep \"$(cat \"$last.delay\")\"; fi\n\
             if [ -f \"$last.duration\" ]; then cat \"$last.duration\"; else echo 'N/A'; exit 1; fi\n",
            dir = dir.path().display()
        );

        let ffmpeg = dir.path().join("ffmpeg");
        let ffprobe = dir.path().join("ffprobe");
        write_executable(&ffmpeg, &ffmpeg_script);
        write_executable(&ffprobe, &ffprobe_script);

        Self {
            dir,
            ffmpeg,
            ffprobe,
        }
    }

    pub fn ffmpeg_path(&self) -> Option<String> {
        Some(self.ffmpeg.to_string_lossy().into_owned())
    }

    pub fn ffprobe_path(&self) -> Option<String> {
        Some(self.ffprobe.to_string_lossy().into_owned())
    }

    /// Arguments of the last fake ffmpeg run
    pub fn ffmpeg_args(&self) -> Option<Vec<String>> {
        std::fs::read_to_string(self.dir.path().join("ffmpeg_args.txt"))
            .ok()
            .map(|s| s.lines().map(str::to_string).collect())
    }

    /// Value following `flag` in the last fake ffmpeg run
    pub fn arg_after(&self, flag: &str) -> Option<String> {
        let args = self.ffmpeg_args()?;
        let pos = args.iter().rposition(|a| a == flag)?;
        args.get(pos + 1).cloned()
    }

    /// Number of fake ffprobe runs so far
    pub fn ffprobe_calls(&self) -> usize {
        std::fs::read_to_string(self.dir.path().join("ffprobe_calls.txt"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    pub fn marker(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(unix)]
fn write_executable(path: &Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, contents).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// Create a music file stub whose fake ffprobe duration is `secs`
pub fn write_track(dir: &Path, name: &str, secs: f64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"ID3").unwrap();
    std::fs::write(dir.join(format!("{name}.duration")), format!("{secs}\n")).unwrap();
    path
}

/// Make the fake ffprobe stall for `secs` before answering for `track`
pub fn delay_track(track: &Path, secs: u32) {
    let mut name = track.as_os_str().to_owned();
    name.push(".delay");
    std::fs::write(PathBuf::from(name), format!("{secs}\n")).unwrap();
}

/// Minimal APP1 segment holding an EXIF `DateTimeOriginal` (`YYYY:MM:DD HH:MM:SS`)
pub fn exif_app1(date_time_original: &str) -> Vec<u8> {
    assert_eq!(date_time_original.len(), 19);

    // little-endian TIFF: IFD0 with an Exif IFD pointer, Exif IFD with one ASCII field
    let mut tiff: Vec<u8> = vec![b'I', b'I', 0x2a, 0x00, 8, 0, 0, 0];
    let exif_ifd: u32 = 8 + 18;
    let value_offset: u32 = exif_ifd + 18;

    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x8769u16.to_le_bytes());
    tiff.extend_from_slice(&4u16.to_le_bytes());
    tiff.extend_from_slice(&1u32.to_le_bytes());
    tiff.extend_from_slice(&exif_ifd.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(&1u16.to_le_bytes());
    tiff.extend_from_slice(&0x9003u16.to_le_bytes());
    tiff.extend_from_slice(&2u16.to_le_bytes());
    tiff.extend_from_slice(&20u32.to_le_bytes());
    tiff.extend_from_slice(&value_offset.to_le_bytes());
    tiff.extend_from_slice(&0u32.to_le_bytes());

    tiff.extend_from_slice(date_time_original.as_bytes());
    tiff.push(0);

    let mut segment = vec![0xff, 0xe1];
    segment.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    segment.extend_from_slice(b"Exif\0\0");
    segment.extend_from_slice(&tiff);
    segment
}

/// Write a small JPEG photo carrying an EXIF capture time
pub fn write_photo_with_exif(dir: &Path, name: &str, date_time_original: &str) -> PathBuf {
    let img = generate_test_image(64, 48, [90, 100, 150, 255]);
    let rgb_img = image::DynamicImage::ImageRgba8(img).to_rgb8();
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 85)
        .encode_image(&rgb_img)
        .unwrap();

    // splice the segment right after SOI
    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    let mut bytes = jpeg[..2].to_vec();
    bytes.extend(exif_app1(date_time_original));
    bytes.extend_from_slice(&jpeg[2..]);

    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Verify that a file exists and has non-zero size
pub fn verify_file_exists_with_size<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.jpg");

        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        save_jpeg(&img, &path, 85).unwrap();

        assert!(verify_file_exists_with_size(&path));
    }
}
