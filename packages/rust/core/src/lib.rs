//! Stage orchestration for coursebook.
//!
//! Each stage reads from and writes to the output tree described by
//! [`coursebook_shared::OutputPaths`]:
//! - [`clean`] — raw lessons → transformed HTML plus `imgs.json`
//! - [`images`] — download every image in `imgs.json`
//! - [`covers`] — one cover page per course part
//! - [`book`] — ordered book records, TOC and metadata in `book.json`

pub mod book;
pub mod clean;
pub mod covers;
pub mod images;

pub use book::{Book, BookMetadata, BookOptions, BookRecord, BookReport, TocEntry, assemble_book};
pub use clean::{CleanReport, clean_documents};
pub use covers::create_covers;
pub use images::{ImageFetcher, ImagesResult, download_images};
