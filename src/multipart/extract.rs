use super::content_type::parse_boundary;
use super::error::MultipartResult;
use super::naming::{UsedNames, part_filename};
use super::reader::MultipartReader;
use super::sink::{ArchiveSink, DirectorySink, ExtractionResult, ListingSink, PartInfo, Sink};
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

/// Where extracted parts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Directory(PathBuf),
    Archive(PathBuf),
    Listing,
}

impl Target {
    /// An output directory wins; otherwise any output file becomes a zip
    /// archive (its extension forced to `.zip`); with neither, list parts.
    pub fn select(output_dir: Option<&Path>, output: Option<&Path>) -> Self {
        match (output_dir, output) {
            (Some(dir), _) => Target::Directory(dir.to_path_buf()),
            (None, Some(file)) => Target::Archive(archive_path(file)),
            (None, None) => Target::Listing,
        }
    }
}

pub fn archive_path(requested: &Path) -> PathBuf {
    let is_zip = requested
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if is_zip {
        requested.to_path_buf()
    } else {
        requested.with_extension("zip")
    }
}

/// Split a `multipart/*` body into parts and feed them to `target`.
///
/// The boundary is validated before anything is created on disk. A failure
/// part-way leaves earlier parts where they were written.
pub fn extract<R, W>(
    content_type: &str,
    body: R,
    target: &Target,
    report: W,
) -> MultipartResult<ExtractionResult>
where
    R: Read,
    W: Write,
{
    let boundary = parse_boundary(content_type)?;
    debug!(%boundary, ?target, "extracting multipart body");
    let reader = MultipartReader::new(body, &boundary);

    match target {
        Target::Directory(dir) => drive(reader, DirectorySink::create(dir, report)?),
        Target::Archive(path) => drive(reader, ArchiveSink::create(path, report)?),
        Target::Listing => drive(reader, ListingSink::new(report)?),
    }
}

fn drive<R: Read, S: Sink>(
    mut reader: MultipartReader<R>,
    mut sink: S,
) -> MultipartResult<ExtractionResult> {
    let mut part_count = 0;
    let mut total_bytes = 0;
    let mut used = UsedNames::default();

    while let Some(mut part) = reader.next_part()? {
        for (name, value) in part.headers().iter() {
            trace!(index = part.index(), %name, %value, "part header");
        }

        let filename = part_filename(
            part.disposition_filename().as_deref(),
            part.content_location(),
            part.index(),
        );
        let info = PartInfo {
            index: part.index(),
            content_type: part.content_type().map(str::to_owned),
            content_location: part.content_location().map(str::to_owned),
            filename: used.claim(filename, part.index()),
        };

        let written = sink.write_part(&info, &mut part)?;
        debug!(index = info.index, filename = %info.filename, written, "part written");

        part_count += 1;
        total_bytes += written;
    }

    let result = ExtractionResult {
        part_count,
        total_bytes,
        destination: sink.destination(),
    };
    sink.finish(&result)?;
    Ok(result)
}
