use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use log::debug;

use crate::error::{ForensicsError, Result};

pub type Metadata = BTreeMap<String, String>;

pub struct ExifExtractor;

impl ExifExtractor {
    /// Best-effort EXIF read. Missing or undecodable metadata yields an empty map.
    pub fn extract<P: AsRef<Path>>(path: P) -> Metadata {
        match Self::try_extract(path.as_ref()) {
            Ok(tags) => tags,
            Err(e) => {
                debug!("No EXIF metadata for {}: {}", path.as_ref().display(), e);
                Metadata::new()
            }
        }
    }

    fn try_extract(path: &Path) -> Result<Metadata> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let exif_reader = exif::Reader::new();

        let exif_data = exif_reader
            .read_from_container(&mut reader)
            .map_err(|e| ForensicsError::MetadataError(e.to_string()))?;

        Ok(Self::parse_exif(&exif_data))
    }

    fn parse_exif(exif: &exif::Exif) -> Metadata {
        let mut all_tags = Metadata::new();

        // primary IFD fields come first, so thumbnail duplicates never overwrite them
        for field in exif.fields() {
            let tag_name = format!("{}", field.tag);
            let value = field.display_value().with_unit(exif).to_string();
            all_tags.entry(tag_name).or_insert(value);
        }

        all_tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::{Field, In, Tag, Value, experimental::Writer};
    use image::{Rgb, RgbImage, codecs::jpeg::JpegEncoder};
    use std::io::Cursor;

    /// Baseline JPEG with an APP1 Exif segment spliced in after SOI.
    fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = Vec::new();
        RgbImage::from_pixel(8, 8, Rgb([90, 120, 150]))
            .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 90))
            .unwrap();

        let mut app1 = vec![0xFF, 0xE1];
        app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        app1.extend_from_slice(b"Exif\0\0");
        app1.extend_from_slice(&tiff);

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&app1);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_missing_file_yields_empty_map() {
        let tags = ExifExtractor::extract("/nonexistent/path/to/image.jpg");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_image_without_exif_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.png");
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])).save(&path).unwrap();

        assert!(ExifExtractor::extract(&path).is_empty());
    }

    #[test]
    fn test_tags_are_extracted() {
        let make = Field {
            tag: Tag::Make,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"Canon".to_vec()]),
        };
        let model = Field {
            tag: Tag::Model,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![b"EOS 5D".to_vec()]),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.jpg");
        std::fs::write(&path, jpeg_with_exif(&[make, model])).unwrap();

        let tags = ExifExtractor::extract(&path);
        assert_eq!(tags.get("Make").map(String::as_str), Some("\"Canon\""));
        assert_eq!(tags.get("Model").map(String::as_str), Some("\"EOS 5D\""));
        assert!(image::open(&path).is_ok());
    }
}
