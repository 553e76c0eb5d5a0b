//! De-multiplexing of WADO-RS `multipart/related` responses into DICOM files.

mod content_type;
mod error;
mod extract;
mod naming;
mod reader;
mod sink;

pub use content_type::{is_multipart, media_type, parse_boundary};
pub use error::*;
pub use extract::{Target, archive_path, extract};
pub use naming::part_filename;
pub use reader::{MultipartReader, Part, PartHeaders};
pub use sink::{ArchiveSink, DirectorySink, ExtractionResult, ListingSink, PartInfo, Sink};
