//! In-process ZIP creation with the `zip` crate.

use crate::backup::archive::walk::archive_entries;
use crate::backup::archive::{ArchiveRequest, ZipCreator, ZipStrategy};
use crate::backup::file_util::{create_private, remove_if_exists};
use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;

use function_name::named;
use zip::write::{FileOptions, SimpleFileOptions};
use zip::{AesMode, CompressionMethod, ZipWriter};

use std::fs::File;
use std::io::{BufWriter, IntoInnerError, Write};
use std::path::Path;

/// Writes AES-256 encrypted entries with the zip library linked into the
/// binary, so it is always available.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibraryZipCreator;

impl ZipCreator for LibraryZipCreator {
    fn strategy(&self) -> ZipStrategy {
        ZipStrategy::Library
    }

    fn is_available(&self) -> bool {
        true
    }

    #[named]
    fn create(&self, request: &ArchiveRequest) -> Result<usize> {
        tracing::info!("Using zip library strategy for ZIP creation");
        request.check()?;
        remove_if_exists(request.destination())?;

        let res = match write_archive(request) {
            Ok(0) => Err(Error::EmptyArchive(request.source().clone())),
            Ok(count) => Ok(count),
            Err(e) => match e.root() {
                Error::EmptyArchive(_) | Error::SourceNotFound(_) => Err(e),
                _ => Err(Error::ArchiveCreationFailed(e.to_string())),
            },
        };

        res.map_err(|mut e| {
            if let Err(e2) = remove_if_exists(request.destination()) {
                e = e.chain(e2);
            }
            e
        })
        .with_debug_object_and_fn_name(request.clone(), function_path!())
    }
}

fn write_archive(request: &ArchiveRequest) -> Result<usize> {
    let file = create_private(request.destination())?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .with_aes_encryption(AesMode::Aes256, request.password().inner());

    let count = if request.source_is_file() {
        let name = request
            .source()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidArchiveRequest(format!("{:?} has no file name", request.source()))
            })?;
        tracing::info!("Adding file: {:?}", request.source());
        add_file(&mut zip, request.source(), name, options.clone())?;
        1
    } else {
        let mut count = 0;
        for entry in archive_entries(request.source(), request.exclusions()) {
            let entry = entry?;
            add_file(&mut zip, &entry.src, entry.name, options.clone())?;
            count += 1;
        }
        count
    };

    let mut file = zip
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?;
    file.flush()?;
    file.sync_all()?;

    Ok(count)
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    src: &Path,
    name: String,
    options: FileOptions<'_, ()>,
) -> Result<()> {
    let mut reader = File::open(src)?;
    zip.start_file(name, options)?;
    std::io::copy(&mut reader, zip)?;
    Ok(())
}
