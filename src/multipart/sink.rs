use super::error::{MultipartError, MultipartResult};
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use zip::{ZipWriter, write::SimpleFileOptions};

const COPY_BUFFER: usize = 64 * 1024;

/// What a sink needs to know about the part it is consuming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub index: usize,
    pub content_type: Option<String>,
    pub content_location: Option<String>,
    pub filename: String,
}

/// Summary of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub part_count: usize,
    pub total_bytes: u64,
    pub destination: String,
}

/// Destination for extracted parts.
pub trait Sink {
    /// Consume one part's body, returning the number of bytes taken.
    fn write_part(&mut self, info: &PartInfo, body: &mut dyn Read) -> MultipartResult<u64>;

    fn destination(&self) -> String;

    fn finish(self, result: &ExtractionResult) -> MultipartResult<()>;
}

/// One file per part inside a directory.
pub struct DirectorySink<W> {
    dir: PathBuf,
    report: W,
}

impl<W: Write> DirectorySink<W> {
    pub fn create(dir: &Path, report: W) -> MultipartResult<Self> {
        fs::create_dir_all(dir).map_err(|source| MultipartError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        Ok(Self {
            dir: dir.to_path_buf(),
            report,
        })
    }
}

impl<W: Write> Sink for DirectorySink<W> {
    fn write_part(&mut self, info: &PartInfo, body: &mut dyn Read) -> MultipartResult<u64> {
        let path = self.dir.join(&info.filename);
        let mut file = File::create(&path).map_err(|source| MultipartError::Write {
            path: path.clone(),
            source,
        })?;

        let written = copy_part(body, &mut file).map_err(|err| err.at(&path))?;
        file.flush().map_err(|source| MultipartError::Write {
            path: path.clone(),
            source,
        })?;

        writeln!(self.report, "Extracted: {} ({written} bytes)", info.filename)
            .map_err(MultipartError::Report)?;
        Ok(written)
    }

    fn destination(&self) -> String {
        self.dir.display().to_string()
    }

    fn finish(mut self, result: &ExtractionResult) -> MultipartResult<()> {
        writeln!(
            self.report,
            "\nExtracted {} files ({} bytes total) to {}",
            result.part_count, result.total_bytes, result.destination
        )
        .map_err(MultipartError::Report)
    }
}

/// One zip entry per part.
pub struct ArchiveSink<W> {
    path: PathBuf,
    zip: ZipWriter<File>,
    report: W,
}

impl<W: Write> ArchiveSink<W> {
    pub fn create(path: &Path, report: W) -> MultipartResult<Self> {
        let file = File::create(path).map_err(|source| MultipartError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            report,
        })
    }
}

impl<W: Write> Sink for ArchiveSink<W> {
    fn write_part(&mut self, info: &PartInfo, body: &mut dyn Read) -> MultipartResult<u64> {
        self.zip
            .start_file(
                info.filename.as_str(),
                SimpleFileOptions::default().large_file(true),
            )
            .map_err(|source| MultipartError::Zip {
                name: info.filename.clone(),
                source,
            })?;

        copy_part(body, &mut self.zip).map_err(|err| err.at(&self.path))
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }

    fn finish(mut self, result: &ExtractionResult) -> MultipartResult<()> {
        self.zip.finish().map_err(|source| MultipartError::Zip {
            name: result.destination.clone(),
            source,
        })?;

        writeln!(
            self.report,
            "Created {} with {} files ({} bytes total)",
            result.destination, result.part_count, result.total_bytes
        )
        .map_err(MultipartError::Report)
    }
}

/// Dry run: counts each part and prints a content-type/location/size row for it.
pub struct ListingSink<W> {
    report: W,
}

impl<W: Write> ListingSink<W> {
    pub fn new(mut report: W) -> MultipartResult<Self> {
        writeln!(
            report,
            "{:>5}  {:<32}  {:<48}  {:>12}",
            "PART", "CONTENT-TYPE", "LOCATION", "BYTES"
        )
        .map_err(MultipartError::Report)?;
        Ok(Self { report })
    }
}

impl<W: Write> Sink for ListingSink<W> {
    fn write_part(&mut self, info: &PartInfo, body: &mut dyn Read) -> MultipartResult<u64> {
        let counted = copy_part(body, &mut io::sink()).map_err(|err| match err {
            CopyError::Read(source) => MultipartError::from_read(source),
            CopyError::Write(source) => MultipartError::Report(source),
        })?;

        writeln!(
            self.report,
            "{:>5}  {:<32}  {:<48}  {:>12}",
            info.index,
            info.content_type.as_deref().unwrap_or("(none)"),
            info.content_location.as_deref().unwrap_or("-"),
            counted
        )
        .map_err(MultipartError::Report)?;
        Ok(counted)
    }

    fn destination(&self) -> String {
        "(listing)".to_string()
    }

    fn finish(mut self, result: &ExtractionResult) -> MultipartResult<()> {
        writeln!(
            self.report,
            "\nTotal: {} parts ({} bytes)\nUse --output <file.zip> or --output-dir <dir> to save them",
            result.part_count, result.total_bytes
        )
        .map_err(MultipartError::Report)
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

impl CopyError {
    fn at(self, path: &Path) -> MultipartError {
        match self {
            CopyError::Read(source) => MultipartError::from_read(source),
            CopyError::Write(source) => MultipartError::Write {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Stream `body` into `dest`, keeping read and write failures apart.
fn copy_part(body: &mut dyn Read, dest: &mut dyn Write) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut total = 0u64;

    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CopyError::Read(err)),
        };
        dest.write_all(&buf[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(index: usize, filename: &str) -> PartInfo {
        PartInfo {
            index,
            content_type: Some("application/dicom".into()),
            content_location: None,
            filename: filename.into(),
        }
    }

    #[test]
    fn directory_sink_writes_files_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let mut report = Vec::new();

        let mut sink = DirectorySink::create(&out, &mut report).unwrap();
        let n = sink
            .write_part(&info(1, "a.dcm"), &mut &b"hello"[..])
            .unwrap();
        assert_eq!(n, 5);
        let result = ExtractionResult {
            part_count: 1,
            total_bytes: 5,
            destination: sink.destination(),
        };
        sink.finish(&result).unwrap();

        assert_eq!(fs::read(out.join("a.dcm")).unwrap(), b"hello");
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("Extracted: a.dcm (5 bytes)"));
        assert!(report.contains("Extracted 1 files (5 bytes total)"));
    }

    #[test]
    fn listing_sink_counts_without_writing() {
        let mut report = Vec::new();
        let mut sink = ListingSink::new(&mut report).unwrap();
        let n = sink
            .write_part(&info(7, "ignored.dcm"), &mut &[0u8; 1000][..])
            .unwrap();
        assert_eq!(n, 1000);
        drop(sink);

        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("application/dicom"));
        assert!(report.contains("1000"));
    }

    #[test]
    fn listing_sink_shows_content_location() {
        let mut report = Vec::new();
        let mut sink = ListingSink::new(&mut report).unwrap();
        let mut part = info(2, "1.2.3.dcm");
        part.content_location = Some("/dicom-web/studies/1/series/2/instances/1.2.3".into());
        sink.write_part(&part, &mut &b"abc"[..]).unwrap();
        drop(sink);

        let report = String::from_utf8(report).unwrap();
        assert!(report.lines().next().unwrap().contains("LOCATION"));
        assert!(report.contains("/dicom-web/studies/1/series/2/instances/1.2.3"));
    }

    #[test]
    fn short_body_read_is_truncation() {
        struct Cut;
        impl Read for Cut {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "cut"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::create(dir.path(), io::sink()).unwrap();
        let err = sink.write_part(&info(1, "a.dcm"), &mut Cut).unwrap_err();
        assert!(matches!(err, MultipartError::Truncated), "{err:?}");

        let mut listing = ListingSink::new(io::sink()).unwrap();
        let err = listing.write_part(&info(1, "a.dcm"), &mut Cut).unwrap_err();
        assert!(matches!(err, MultipartError::Truncated), "{err:?}");
    }
}
