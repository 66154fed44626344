// THEORY:
// Video decoding is outside the engine. The pipelines only need random access to
// already-decoded frames by index, because the two-pass analysis walks the video
// twice. `FrameSource` is that contract. An in-memory `Vec<RgbImage>` implements it
// for tests and small clips; `ImageDirectory` implements it over a directory of
// frames exported by an external decoder (`frame_0.png`, `frame_1.png`, ...).
//
// A frame has two identities: its position in the source (0..len) and its frame
// number, the `n` its detection artifacts and annotated output are stored under.
// They coincide for in-memory frames. A directory may start at 1 or have gaps, so
// every artifact lookup goes through `frame_number`.

use crate::error::{PossessionError, Result};
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Random access to decoded RGB frames.
pub trait FrameSource {
    fn len(&self) -> usize;

    fn frame(&self, index: usize) -> Result<RgbImage>;

    /// The frame number of the frame at position `index`.
    fn frame_number(&self, index: usize) -> usize {
        index
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameSource for Vec<RgbImage> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn frame(&self, index: usize) -> Result<RgbImage> {
        self.get(index).cloned().ok_or_else(|| {
            PossessionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("frame {index} out of range"),
            ))
        })
    }
}

/// Frames stored as `frame_<n>.<png|jpg|jpeg>` images, ordered by `n`.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    /// `(frame number, path)`, sorted by frame number.
    frames: Vec<(usize, PathBuf)>,
}

impl ImageDirectory {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut indexed: Vec<(usize, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if let Some(index) = frame_index(&path) {
                indexed.push((index, path));
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(Self { frames: indexed })
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.frames.iter().map(|(_, path)| path.as_path())
    }
}

impl FrameSource for ImageDirectory {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn frame(&self, index: usize) -> Result<RgbImage> {
        let (_, path) = self.frames.get(index).ok_or_else(|| {
            PossessionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("frame {index} out of range"),
            ))
        })?;
        Ok(image::open(path)?.to_rgb8())
    }

    fn frame_number(&self, index: usize) -> usize {
        self.frames.get(index).map_or(index, |(number, _)| *number)
    }
}

fn frame_index(path: &Path) -> Option<usize> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !FRAME_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    path.file_stem()?.to_str()?.strip_prefix("frame_")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn directory_frames_are_ordered_numerically() {
        let dir = tempdir().expect("temp dir");
        for index in [10usize, 2, 0, 1] {
            let frame = RgbImage::from_pixel(3, 2, Rgb([index as u8, 0, 0]));
            frame.save(dir.path().join(format!("frame_{index}.png"))).expect("save");
        }
        fs::write(dir.path().join("notes.txt"), "not a frame").expect("write");

        let source = ImageDirectory::open(dir.path()).expect("open");
        assert_eq!(source.len(), 4);
        assert_eq!(source.frame(3).expect("frame").get_pixel(0, 0), &Rgb([10, 0, 0]));
        assert_eq!(source.frame(1).expect("frame").dimensions(), (3, 2));
        assert!(source.frame(4).is_err());
    }

    #[test]
    fn gapped_directory_reports_each_file_frame_number() {
        let dir = tempdir().expect("temp dir");
        for number in [1usize, 2, 5] {
            let frame = RgbImage::from_pixel(3, 2, Rgb([number as u8, 0, 0]));
            frame.save(dir.path().join(format!("frame_{number}.png"))).expect("save");
        }

        let source = ImageDirectory::open(dir.path()).expect("open");
        let numbers: Vec<usize> = (0..source.len()).map(|index| source.frame_number(index)).collect();
        assert_eq!(numbers, vec![1, 2, 5]);
        assert_eq!(source.frame(2).expect("frame").get_pixel(0, 0), &Rgb([5, 0, 0]));
        assert!(source.paths().all(|path| path.starts_with(dir.path())));
    }

    #[test]
    fn in_memory_frames_are_cloned_out() {
        let frames = vec![RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]))];
        assert_eq!(FrameSource::len(&frames), 1);
        assert_eq!(frames.frame_number(0), 0);
        assert_eq!(frames.frame(0).expect("frame").get_pixel(1, 1), &Rgb([1, 2, 3]));
        assert!(frames.frame(1).is_err());
    }
}
