// Copyright 2018 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thin wrapper around `zip`/`walkdir` for packaging a whole directory
//! into a single stream and back, used to ship a TxHashSet snapshot to a
//! fast-syncing peer without inventing a bespoke container format.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Recursively zips `src_dir` into `dst_file`. Stored (uncompressed):
/// the contents are already dense binary (MMR hash files, an LMDB
/// database), so compression would cost CPU for little size benefit.
pub fn compress(src_dir: &Path, dst_file: &File) -> Result<(), ZipError> {
	if !src_dir.is_dir() {
		return Err(ZipError::Io(io::Error::new(
			io::ErrorKind::Other,
			"source must be a directory",
		)));
	}

	let options = FileOptions::default()
		.compression_method(CompressionMethod::Stored)
		.unix_permissions(0o644);

	let mut zip = ZipWriter::new(dst_file);
	for entry in walkdir::WalkDir::new(src_dir).into_iter().filter_map(|e| e.ok()) {
		let path = entry.path();
		if !path.is_file() {
			continue;
		}
		let name = path
			.strip_prefix(src_dir)
			.expect("walked entry under src_dir")
			.to_string_lossy();
		zip.start_file(name, options)?;
		let mut f = File::open(path)?;
		io::copy(&mut f, &mut zip)?;
	}
	zip.finish()?;
	dst_file.sync_all()?;
	Ok(())
}

/// Extracts every entry of the zip read from `src` into `dest_dir`,
/// creating it if necessary.
pub fn decompress<R: io::Read + io::Seek>(src: R, dest_dir: &Path) -> Result<(), ZipError> {
	fs::create_dir_all(dest_dir)?;
	let mut archive = ZipArchive::new(src)?;
	for i in 0..archive.len() {
		let mut entry = archive.by_index(i)?;
		let out_path = dest_dir.join(entry.sanitized_name());
		if let Some(parent) = out_path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut out = File::create(out_path)?;
		io::copy(&mut entry, &mut out)?;
	}
	Ok(())
}
