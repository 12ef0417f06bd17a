use crate::backend::Element;
use crate::error::{Error, Result};
use burn::data::dataset::{
    Dataset, InMemDataset,
    transform::{Mapper, MapperDataset},
};
use burn_common::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fs::{File, create_dir_all};
use std::io::Read;
use std::path::{Path, PathBuf};

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

pub const IMAGES_MAGIC: u32 = 2051;
pub const LABELS_MAGIC: u32 = 2049;

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_LABELS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    Train,
    Test,
}

impl MnistSplit {
    pub fn name(&self) -> &'static str {
        match self {
            MnistSplit::Train => "train",
            MnistSplit::Test => "test",
        }
    }

    fn images_file(&self) -> &'static str {
        match self {
            MnistSplit::Train => TRAIN_IMAGES,
            MnistSplit::Test => TEST_IMAGES,
        }
    }

    fn labels_file(&self) -> &'static str {
        match self {
            MnistSplit::Train => TRAIN_LABELS,
            MnistSplit::Test => TEST_LABELS,
        }
    }
}

/// Where the raw IDX files are read from.
#[derive(Debug, Clone, Default)]
pub enum MnistSource {
    /// The burn-dataset cache directory, filled from the web when a file is missing.
    ///
    /// The fetch goes through burn-dataset's downloader, which panics on a network failure
    /// instead of returning an error. Use [`MnistSource::Local`] on machines without access.
    #[default]
    Cache,
    /// A directory already holding the IDX files, either raw or gzipped (`<name>.gz`).
    Local(PathBuf),
}

impl MnistSource {
    /// Returns the directory holding the files of `split`, downloading them first if needed.
    fn prepare(&self, split: MnistSplit) -> Result<PathBuf> {
        match self {
            MnistSource::Local(dir) => Ok(dir.clone()),
            MnistSource::Cache => {
                let cache_dir = dirs::home_dir()
                    .ok_or_else(|| Error::Download("could not get the home directory".into()))?
                    .join(".cache")
                    .join("burn-dataset");
                let split_dir = cache_dir.join("mnist").join(split.name());
                create_dir_all(&split_dir)?;
                download_file(split.images_file(), &split_dir)?;
                download_file(split.labels_file(), &split_dir)?;
                Ok(split_dir)
            }
        }
    }
}

/// Download a file from the MNIST mirror into `dest_dir`, unless already present.
fn download_file(name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = dest_dir.join(name);

    if !file_name.exists() {
        let url = format!("{URL}{name}.gz");
        log::info!("downloading {url} into {dest_dir:?}");
        let bytes = download_file_as_bytes(&url, name);
        store_gz(&bytes, &file_name)?;
    }

    Ok(file_name)
}

/// Decompresses `bytes` into `file_name`.
///
/// The data goes to a `.part` sibling first and is renamed into place once complete,
/// so `file_name` never holds a truncated file.
fn store_gz(bytes: &[u8], file_name: &Path) -> Result<()> {
    let part_name = file_name.with_extension("part");
    let written = File::create(&part_name).and_then(|mut output_file| {
        let mut gz_buffer = GzDecoder::new(bytes);
        std::io::copy(&mut gz_buffer, &mut output_file)?;
        output_file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&part_name);
        return Err(e.into());
    }
    std::fs::rename(&part_name, file_name)?;
    Ok(())
}

/// Reads `dir/name`, falling back to the gzipped `dir/name.gz`.
fn read_idx_file(dir: &Path, name: &str) -> Result<(PathBuf, Vec<u8>)> {
    let path = dir.join(name);
    let mut bytes = Vec::new();
    if path.exists() {
        File::open(&path)?.read_to_end(&mut bytes)?;
        return Ok((path, bytes));
    }
    let gz_path = dir.join(format!("{name}.gz"));
    if gz_path.exists() {
        GzDecoder::new(File::open(&gz_path)?).read_to_end(&mut bytes)?;
        return Ok((gz_path, bytes));
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("neither {path:?} nor {gz_path:?} exist"),
    )))
}

fn be_u32(bytes: &[u8], offset: usize, path: &Path) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::MalformedIdx {
            path: path.to_path_buf(),
            msg: format!("header truncated at byte {offset}"),
        })
}

fn check_magic(bytes: &[u8], expected: u32, path: &Path) -> Result<()> {
    let found = be_u32(bytes, 0, path)?;
    if found != expected {
        return Err(Error::BadMagic {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}

/// Parses an IDX3 image file. Each image is a vector of `WIDTH * HEIGHT` bytes.
///
/// Header (big-endian u32): magic, count, rows, cols.
pub fn parse_images(bytes: &[u8], path: &Path) -> Result<Vec<Vec<u8>>> {
    check_magic(bytes, IMAGES_MAGIC, path)?;
    let count = be_u32(bytes, 4, path)? as usize;
    let rows = be_u32(bytes, 8, path)? as usize;
    let cols = be_u32(bytes, 12, path)? as usize;
    if rows != HEIGHT || cols != WIDTH {
        return Err(Error::MalformedIdx {
            path: path.to_path_buf(),
            msg: format!("expected {HEIGHT}x{WIDTH} images, found {rows}x{cols}"),
        });
    }

    let body = &bytes[16..];
    let expected_len = count * WIDTH * HEIGHT;
    if body.len() < expected_len {
        return Err(Error::MalformedIdx {
            path: path.to_path_buf(),
            msg: format!("expected {expected_len} pixel bytes, found {}", body.len()),
        });
    }

    Ok(body[..expected_len]
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Parses an IDX1 label file.
///
/// Header (big-endian u32): magic, count.
pub fn parse_labels(bytes: &[u8], path: &Path) -> Result<Vec<u8>> {
    check_magic(bytes, LABELS_MAGIC, path)?;
    let count = be_u32(bytes, 4, path)? as usize;

    let body = &bytes[8..];
    if body.len() < count {
        return Err(Error::MalformedIdx {
            path: path.to_path_buf(),
            msg: format!("expected {count} labels, found {}", body.len()),
        });
    }
    if let Some(label) = body[..count].iter().find(|&&l| l as usize >= NUM_LABELS) {
        return Err(Error::MalformedIdx {
            path: path.to_path_buf(),
            msg: format!("label {label} out of range"),
        });
    }

    Ok(body[..count].to_vec())
}

/// MNIST item.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MnistItem {
    /// Image as a flat array of brightness values, in between 0.0 and 255.0.
    ///
    /// # Shape
    /// [HEIGHT * WIDTH]
    pub image: Vec<Element>,

    /// Label of the image, in between 0 and 9.
    pub label: u8,
}

#[derive(Deserialize, Debug, Clone)]
struct MnistItemRaw {
    pub image_bytes: Vec<u8>,
    pub label: u8,
}

struct BytesToImage;

impl Mapper<MnistItemRaw, MnistItem> for BytesToImage {
    fn map(&self, item: &MnistItemRaw) -> MnistItem {
        debug_assert_eq!(item.image_bytes.len(), WIDTH * HEIGHT);

        let image: Vec<Element> = item
            .image_bytes
            .iter()
            .map(|brightness| {
                let element: Element = (*brightness).as_();
                element
            })
            .collect();

        MnistItem {
            image,
            label: item.label,
        }
    }
}

type MappedDataset = MapperDataset<InMemDataset<MnistItemRaw>, BytesToImage, MnistItemRaw>;

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes.
/// There are 60,000 training images and 10,000 test images.
pub struct MnistDataset {
    dataset: MappedDataset,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl MnistDataset {
    /// Loads `split` from `source`, keeping at most `limit` examples.
    pub fn new(split: MnistSplit, source: &MnistSource, limit: Option<usize>) -> Result<Self> {
        let root = source.prepare(split)?;

        // MNIST is tiny so we can load it in-memory
        // Train images (u8): 28 * 28 * 60000 = 47.04Mb
        // Test images (u8): 28 * 28 * 10000 = 7.84Mb
        let (images_path, images_bytes) = read_idx_file(&root, split.images_file())?;
        let images = parse_images(&images_bytes, &images_path)?;
        let (labels_path, labels_bytes) = read_idx_file(&root, split.labels_file())?;
        let labels = parse_labels(&labels_bytes, &labels_path)?;

        if images.len() != labels.len() {
            return Err(Error::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }

        let items: Vec<_> = images
            .into_iter()
            .zip(labels)
            .take(limit.unwrap_or(usize::MAX))
            .map(|(image_bytes, label)| MnistItemRaw { image_bytes, label })
            .collect();
        log::info!("loaded {} {} examples from {root:?}", items.len(), split.name());

        let dataset = InMemDataset::new(items);
        let dataset = MapperDataset::new(dataset, BytesToImage);

        Ok(Self { dataset })
    }

    pub fn train(source: &MnistSource, limit: Option<usize>) -> Result<Self> {
        Self::new(MnistSplit::Train, source, limit)
    }

    pub fn test(source: &MnistSource, limit: Option<usize>) -> Result<Self> {
        Self::new(MnistSplit::Test, source, limit)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    pub fn images_idx(images: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(IMAGES_MAGIC.to_be_bytes());
        bytes.extend((images.len() as u32).to_be_bytes());
        bytes.extend((HEIGHT as u32).to_be_bytes());
        bytes.extend((WIDTH as u32).to_be_bytes());
        for image in images {
            bytes.extend(image);
        }
        bytes
    }

    pub fn labels_idx(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend(LABELS_MAGIC.to_be_bytes());
        bytes.extend((labels.len() as u32).to_be_bytes());
        bytes.extend(labels);
        bytes
    }

    /// Image whose pixels all hold `value`.
    pub fn flat_image(value: u8) -> Vec<u8> {
        vec![value; WIDTH * HEIGHT]
    }

    /// Writes a split with one image per label, the image brightness being `label * 10`.
    pub fn write_split(dir: &Path, split: MnistSplit, labels: &[u8]) {
        let images: Vec<_> = labels.iter().map(|&l| flat_image(l * 10)).collect();
        std::fs::write(dir.join(split.images_file()), images_idx(&images)).unwrap();
        std::fs::write(dir.join(split.labels_file()), labels_idx(labels)).unwrap();
    }

    #[test]
    fn loads_local_split() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_split(dir.path(), MnistSplit::Train, &[3, 1, 4]);

        let source = MnistSource::Local(dir.path().to_path_buf());
        let dataset = MnistDataset::train(&source, None).unwrap();
        assert_eq!(dataset.len(), 3);

        let item = dataset.get(2).unwrap();
        assert_eq!(item.label, 4);
        assert_eq!(item.image.len(), WIDTH * HEIGHT);
        assert!(item.image.iter().all(|&p| p == 40.0));
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn limit_keeps_the_first_examples() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_split(dir.path(), MnistSplit::Test, &[7, 8, 9, 0]);

        let source = MnistSource::Local(dir.path().to_path_buf());
        let dataset = MnistDataset::test(&source, Some(2)).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().label, 8);
    }

    #[test]
    fn reads_gzipped_files() {
        let dir = temp_dir::TempDir::new().unwrap();
        let labels = [2u8, 5];
        let images: Vec<_> = labels.iter().map(|&l| flat_image(l)).collect();
        for (name, bytes) in [
            (TEST_IMAGES, images_idx(&images)),
            (TEST_LABELS, labels_idx(&labels)),
        ] {
            let file = File::create(dir.path().join(format!("{name}.gz"))).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&bytes).unwrap();
            encoder.finish().unwrap();
        }

        let source = MnistSource::Local(dir.path().to_path_buf());
        let dataset = MnistDataset::test(&source, None).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().label, 2);
    }

    fn gz(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn store_gz_replaces_a_leftover_part_file() {
        let dir = temp_dir::TempDir::new().unwrap();
        let file_name = dir.path().join(TRAIN_LABELS);
        let part_name = dir.path().join(format!("{TRAIN_LABELS}.part"));
        std::fs::write(&part_name, b"interrupted").unwrap();

        let labels = labels_idx(&[1, 2, 3]);
        store_gz(&gz(&labels), &file_name).unwrap();
        assert_eq!(std::fs::read(&file_name).unwrap(), labels);
        assert!(!part_name.exists());
    }

    #[test]
    fn leftover_part_files_are_not_read() {
        let dir = temp_dir::TempDir::new().unwrap();
        write_split(dir.path(), MnistSplit::Train, &[6, 7]);
        for name in [TRAIN_IMAGES, TRAIN_LABELS] {
            std::fs::write(dir.path().join(format!("{name}.part")), b"interrupted").unwrap();
        }

        let source = MnistSource::Local(dir.path().to_path_buf());
        let dataset = MnistDataset::train(&source, None).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().label, 7);
    }

    #[test]
    fn corrupt_download_leaves_nothing_behind() {
        let dir = temp_dir::TempDir::new().unwrap();
        let file_name = dir.path().join(TEST_IMAGES);

        assert!(store_gz(b"not a gzip stream", &file_name).is_err());
        assert!(!file_name.exists());
        assert!(!dir.path().join(format!("{TEST_IMAGES}.part")).exists());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = labels_idx(&[1, 2]);
        bytes[3] = 0;
        let err = parse_labels(&bytes, Path::new("labels")).unwrap_err();
        assert!(matches!(
            err,
            Error::BadMagic {
                expected: LABELS_MAGIC,
                ..
            }
        ));
    }

    #[test]
    fn rejects_truncated_images() {
        let mut bytes = images_idx(&[flat_image(0), flat_image(1)]);
        bytes.truncate(bytes.len() - 1);
        let err = parse_images(&bytes, Path::new("images")).unwrap_err();
        assert!(matches!(err, Error::MalformedIdx { .. }));
    }

    #[test]
    fn rejects_wrong_image_dimensions() {
        let mut bytes = images_idx(&[flat_image(0)]);
        bytes[11] = 32;
        let err = parse_images(&bytes, Path::new("images")).unwrap_err();
        assert!(matches!(err, Error::MalformedIdx { .. }));
    }

    #[test]
    fn rejects_out_of_range_labels() {
        let bytes = labels_idx(&[1, 10]);
        let err = parse_labels(&bytes, Path::new("labels")).unwrap_err();
        assert!(matches!(err, Error::MalformedIdx { .. }));
    }

    #[test]
    fn rejects_count_mismatch() {
        let dir = temp_dir::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(TRAIN_IMAGES),
            images_idx(&[flat_image(0), flat_image(1)]),
        )
        .unwrap();
        std::fs::write(dir.path().join(TRAIN_LABELS), labels_idx(&[0])).unwrap();

        let source = MnistSource::Local(dir.path().to_path_buf());
        let err = MnistDataset::train(&source, None).err().unwrap();
        assert!(matches!(
            err,
            Error::CountMismatch {
                images: 2,
                labels: 1
            }
        ));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = temp_dir::TempDir::new().unwrap();
        let source = MnistSource::Local(dir.path().to_path_buf());
        let err = MnistDataset::train(&source, None).err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
