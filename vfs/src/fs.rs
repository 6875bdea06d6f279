//! The file-system layer: files, directories and open file descriptors
//! built on top of the block storage engine in [`crate::storage`].
//!
//! Every operation here is expressed purely in terms of
//! [`StorageEngine`]'s region API (allocate/free/jump/read/write/seek); this
//! layer never touches the backing device directly.

use crate::error::{FsError, Result};
use crate::layout::{EntryType, RawDirEntry, DIR_ENTRY_SIZE, INVALID, MAX_NAME_LEN};
use crate::storage::StorageEngine;
use relative_path::{Component, RelativePath};
use std::path::Path;

/// Re-exported so callers can build a seek target without depending on
/// `vfs` for anything but the type name; the semantics (absolute, relative
/// to the cursor, relative to the end) are exactly `std::io`'s.
pub use std::io::SeekFrom;

const MAX_DESCRIPTORS: usize = 256;
const ROOT_REGION: u16 = 0;

/// Flags controlling [`VirtualFileSystem::open`], built the same way as
/// [`std::fs::OpenOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    create: bool,
    exclusive: bool,
    truncate: bool,
    append: bool,
}

impl OpenFlags {
    /// Start from every flag cleared.
    pub fn new() -> OpenFlags {
        OpenFlags::default()
    }

    /// Create the file if it does not already exist.
    pub fn create(mut self, create: bool) -> OpenFlags {
        self.create = create;
        self
    }

    /// Combined with `create`, fail if the file already exists.
    pub fn exclusive(mut self, exclusive: bool) -> OpenFlags {
        self.exclusive = exclusive;
        self
    }

    /// Discard the file's existing content, resetting its length to zero.
    pub fn truncate(mut self, truncate: bool) -> OpenFlags {
        self.truncate = truncate;
        self
    }

    /// Position the cursor at the end of the file once opened.
    pub fn append(mut self, append: bool) -> OpenFlags {
        self.append = append;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Descriptor {
    content_region: u16,
    metadata_region: u16,
    length: u64,
    cursor: u64,
}

/// A virtual file system persisted inside a single host file.
///
/// Holds the storage engine, the table of open file descriptors, and the
/// cursor-affinity cache: which descriptor, if any, the storage engine's
/// physical cursor is currently positioned for, so repeated reads/writes to
/// the same descriptor skip redundant repositioning.
#[derive(Debug)]
pub struct VirtualFileSystem {
    storage: StorageEngine,
    descriptors: Vec<Option<Descriptor>>,
    cursor_owner: Option<usize>,
}

impl VirtualFileSystem {
    /// Format a new backing file at `path` and mount it, with an empty
    /// root directory.
    pub fn format<P: AsRef<Path>>(
        path: P,
        block_size: u16,
        block_count: u16,
    ) -> Result<VirtualFileSystem> {
        let storage = StorageEngine::format(path, block_size, block_count)?;
        Ok(VirtualFileSystem {
            storage,
            descriptors: vec![None; MAX_DESCRIPTORS],
            cursor_owner: None,
        })
    }

    /// Mount an existing backing file at `path`.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<VirtualFileSystem> {
        let storage = StorageEngine::open_existing(path)?;
        Ok(VirtualFileSystem {
            storage,
            descriptors: vec![None; MAX_DESCRIPTORS],
            cursor_owner: None,
        })
    }

    /// Open `path`, returning a descriptor usable with
    /// [`read`](Self::read)/[`write`](Self::write)/[`seek`](Self::seek).
    pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<usize> {
        let slot = self
            .descriptors
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::OutOfDescriptors)?;
        self.cursor_owner = None;

        let (dir_region, name) = navigate_to_parent(&mut self.storage, path)?;
        let found = lookup_entry(&mut self.storage, dir_region, &name, EntryType::File)?;

        let (content_region, metadata_region, length, entry_offset) = match found {
            Some(f) => {
                if flags.exclusive {
                    return Err(FsError::AlreadyExists(path.to_string()));
                }
                let length = read_file_length(&mut self.storage, f.raw.metadata)?;
                (f.raw.content, f.raw.metadata, length, f.offset)
            }
            None => {
                if !flags.create {
                    return Err(FsError::NoSuchPath(path.to_string()));
                }
                let (content_region, metadata_region, offset) =
                    create_file_entry(&mut self.storage, dir_region, &name)?;
                (content_region, metadata_region, 0, offset)
            }
        };

        let mut content_region = content_region;
        let mut length = length;

        if flags.truncate {
            self.storage.free_region(content_region)?;
            let new_content = self.storage.allocate_region(INVALID)?;
            if new_content == INVALID {
                return Err(FsError::OutOfSpace);
            }
            write_entry_content(&mut self.storage, dir_region, entry_offset, new_content)?;
            write_file_length(&mut self.storage, metadata_region, 0)?;
            content_region = new_content;
            length = 0;
        }

        let cursor = if flags.append { length } else { 0 };
        self.descriptors[slot] = Some(Descriptor {
            content_region,
            metadata_region,
            length,
            cursor,
        });
        Ok(slot)
    }

    /// Close a descriptor previously returned by [`open`](Self::open).
    pub fn close(&mut self, fd: usize) -> Result<()> {
        let slot = self
            .descriptors
            .get_mut(fd)
            .ok_or(FsError::InvalidDescriptor)?;
        if slot.is_none() {
            return Err(FsError::InvalidDescriptor);
        }
        *slot = None;
        if self.cursor_owner == Some(fd) {
            self.cursor_owner = None;
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the descriptor's cursor, clamped to
    /// the file's length. Returns the number of bytes actually read.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let (content_region, length, cursor) = self.descriptor_state(fd)?;
        self.ensure_cursor(fd, content_region, cursor)?;

        let available = length.saturating_sub(cursor);
        let to_read = (buf.len() as u64).min(available) as usize;
        let n = self.storage.read_in_region(&mut buf[..to_read])?;

        if let Some(d) = self.descriptors[fd].as_mut() {
            d.cursor += n as u64;
        }
        Ok(n)
    }

    /// Write `buf` at the descriptor's cursor, extending the file's length
    /// if the write runs past the previous end. Returns the number of
    /// bytes actually written, short only if the storage engine runs out
    /// of free blocks.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize> {
        let (content_region, mut length, cursor) = self.descriptor_state(fd)?;
        self.ensure_cursor(fd, content_region, cursor)?;

        let n = self.storage.write_in_region(buf)?;
        let new_cursor = cursor + n as u64;
        if let Some(d) = self.descriptors[fd].as_mut() {
            d.cursor = new_cursor;
        }

        if new_cursor > length {
            length = new_cursor;
            let metadata_region = self.descriptors[fd]
                .as_ref()
                .ok_or(FsError::InvalidDescriptor)?
                .metadata_region;
            write_file_length(&mut self.storage, metadata_region, length)?;
            if let Some(d) = self.descriptors[fd].as_mut() {
                d.length = length;
            }
            // Writing the metadata region moved the physical cursor away
            // from the content region.
            self.cursor_owner = None;
        }
        Ok(n)
    }

    /// Move the descriptor's cursor, clamped to `[0, length]`.
    pub fn seek(&mut self, fd: usize, pos: SeekFrom) -> Result<u64> {
        let (_, length, cursor) = self.descriptor_state(fd)?;

        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => cursor as i64 + offset,
            SeekFrom::End(offset) => length as i64 + offset,
        };
        let clamped = target.clamp(0, length as i64) as u64;

        if let Some(d) = self.descriptors[fd].as_mut() {
            d.cursor = clamped;
        }
        // The descriptor's logical cursor no longer matches wherever the
        // physical cursor last was left, even if this descriptor owned it.
        self.cursor_owner = None;
        Ok(clamped)
    }

    /// Create a new, empty directory at `path`.
    ///
    /// Does not check for name collisions beyond the final component: two
    /// entries with the same name created by separate, racing callers
    /// would both succeed, since there is no reservation step.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.cursor_owner = None;
        let (dir_region, name) = navigate_to_parent(&mut self.storage, path)?;

        let content_region = self.storage.allocate_region(INVALID)?;
        if content_region == INVALID {
            return Err(FsError::OutOfSpace);
        }
        let metadata_region = self.storage.allocate_region(INVALID)?;
        if metadata_region == INVALID {
            self.storage.free_region(content_region)?;
            return Err(FsError::OutOfSpace);
        }

        find_free_slot(&mut self.storage, dir_region)?;
        write_raw_entry(
            &mut self.storage,
            &RawDirEntry::new(EntryType::Directory, metadata_region, content_region),
        )?;

        self.storage.jump_to_region(metadata_region)?;
        write_name(&mut self.storage, &name)?;
        Ok(())
    }

    /// Remove the directory at `path`. Fails if it still has any entries.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.cursor_owner = None;
        let (dir_region, name) = navigate_to_parent(&mut self.storage, path)?;
        let found = lookup_entry(&mut self.storage, dir_region, &name, EntryType::Directory)?
            .ok_or_else(|| FsError::NoSuchPath(path.to_string()))?;
        if !is_region_empty(&mut self.storage, found.raw.content)? {
            return Err(FsError::NotEmpty(path.to_string()));
        }

        mark_entry_unused(&mut self.storage, dir_region, found.offset)?;
        self.storage.free_region(found.raw.content)?;
        self.storage.free_region(found.raw.metadata)?;
        Ok(())
    }

    /// Remove the file at `path`.
    ///
    /// Descriptors already open on this file are not invalidated: their
    /// next read or write will operate on freed blocks. Close a file
    /// before unlinking it.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        self.cursor_owner = None;
        let (dir_region, name) = navigate_to_parent(&mut self.storage, path)?;
        let found = lookup_entry(&mut self.storage, dir_region, &name, EntryType::File)?
            .ok_or_else(|| FsError::NoSuchPath(path.to_string()))?;

        mark_entry_unused(&mut self.storage, dir_region, found.offset)?;
        self.storage.free_region(found.raw.content)?;
        self.storage.free_region(found.raw.metadata)?;
        Ok(())
    }

    fn descriptor_state(&self, fd: usize) -> Result<(u16, u64, u64)> {
        let d = self
            .descriptors
            .get(fd)
            .and_then(|d| d.as_ref())
            .ok_or(FsError::InvalidDescriptor)?;
        Ok((d.content_region, d.length, d.cursor))
    }

    fn ensure_cursor(&mut self, fd: usize, content_region: u16, cursor: u64) -> Result<()> {
        if self.cursor_owner != Some(fd) {
            self.storage.jump_to_region(content_region)?;
            self.storage.seek_in_region(cursor as i64)?;
            self.cursor_owner = Some(fd);
        }
        Ok(())
    }
}

struct FoundEntry {
    offset: u64,
    raw: RawDirEntry,
}

/// Split `path` on `/`, rejecting empty components and `.`/`..`, and
/// return its directory components plus the name of the final one.
fn split_path(path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_start_matches('/');
    let relative = RelativePath::new(trimmed);

    let mut components = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                if part.is_empty() || part.len() > MAX_NAME_LEN {
                    return Err(FsError::InvalidName(part.to_string()));
                }
                components.push(part.to_string());
            }
            Component::CurDir | Component::ParentDir => {
                return Err(FsError::InvalidPath(path.to_string()));
            }
        }
    }
    if components.is_empty() {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    Ok(components)
}

/// Walk from the root directory down to the directory that should contain
/// `path`'s final component, returning that directory's region and the
/// component's name.
fn navigate_to_parent(storage: &mut StorageEngine, path: &str) -> Result<(u16, String)> {
    let mut components = split_path(path)?;
    let name = components.pop().unwrap();

    let mut region = ROOT_REGION;
    for component in &components {
        match lookup_entry(storage, region, component, EntryType::Directory)? {
            Some(found) => region = found.raw.content,
            None => return Err(FsError::NoSuchPath(path.to_string())),
        }
    }
    Ok((region, name))
}

/// Scan `dir_region` for a live entry of type `want_type` named `name`.
/// File and directory names live in separate namespaces within the same
/// region, so callers filter by type rather than matching on name alone.
/// Returns the entry's offset within the region (for later use with
/// [`mark_entry_unused`] or [`write_entry_content`]) alongside its raw data.
fn lookup_entry(
    storage: &mut StorageEngine,
    dir_region: u16,
    name: &str,
    want_type: EntryType,
) -> Result<Option<FoundEntry>> {
    storage.jump_to_region(dir_region)?;
    loop {
        let offset = storage.region_offset();
        let raw = read_raw_entry(storage)?;
        let entry_type = match EntryType::from_code(raw.type_code) {
            Some(EntryType::End) | None => return Ok(None),
            Some(EntryType::Unused) => continue,
            Some(t) => t,
        };

        if entry_type != want_type {
            continue;
        }

        let next_offset = storage.region_offset();
        let entry_name = read_entry_name(storage, entry_type, raw.metadata)?;
        storage.jump_to_region(dir_region)?;
        storage.seek_in_region(next_offset as i64)?;

        if entry_name == name {
            return Ok(Some(FoundEntry { offset, raw }));
        }
    }
}

/// Whether `region` (a directory's content region) has no live entries.
fn is_region_empty(storage: &mut StorageEngine, region: u16) -> Result<bool> {
    storage.jump_to_region(region)?;
    loop {
        let raw = read_raw_entry(storage)?;
        match EntryType::from_code(raw.type_code) {
            Some(EntryType::End) | None => return Ok(true),
            Some(EntryType::Unused) => continue,
            Some(_) => return Ok(false),
        }
    }
}

/// Position the cursor at the first `End`/`Unused` slot in `dir_region`,
/// ready for a 5-byte entry to be written over it.
///
/// Re-jumps to `dir_region` and seeks forward by the found offset rather
/// than backing up by a fixed `DIR_ENTRY_SIZE`: `read_in_region` can return
/// short when a block boundary falls mid-entry (any `block_size` that isn't
/// a multiple of `DIR_ENTRY_SIZE`), and a fixed-width undo after a short
/// read lands inside the previous entry instead of back at the start of
/// this one.
fn find_free_slot(storage: &mut StorageEngine, dir_region: u16) -> Result<u64> {
    storage.jump_to_region(dir_region)?;
    loop {
        let offset = storage.region_offset();
        let raw = read_raw_entry(storage)?;
        match EntryType::from_code(raw.type_code) {
            Some(EntryType::End) | Some(EntryType::Unused) | None => {
                storage.jump_to_region(dir_region)?;
                storage.seek_in_region(offset as i64)?;
                return Ok(offset);
            }
            Some(_) => continue,
        }
    }
}

fn create_file_entry(
    storage: &mut StorageEngine,
    dir_region: u16,
    name: &str,
) -> Result<(u16, u16, u64)> {
    let content_region = storage.allocate_region(INVALID)?;
    if content_region == INVALID {
        return Err(FsError::OutOfSpace);
    }
    let metadata_region = storage.allocate_region(INVALID)?;
    if metadata_region == INVALID {
        storage.free_region(content_region)?;
        return Err(FsError::OutOfSpace);
    }

    let offset = find_free_slot(storage, dir_region)?;
    write_raw_entry(
        storage,
        &RawDirEntry::new(EntryType::File, metadata_region, content_region),
    )?;

    storage.jump_to_region(metadata_region)?;
    write_u64(storage, 0)?;
    write_name(storage, name)?;

    Ok((content_region, metadata_region, offset))
}

fn mark_entry_unused(storage: &mut StorageEngine, dir_region: u16, offset: u64) -> Result<()> {
    storage.jump_to_region(dir_region)?;
    storage.seek_in_region(offset as i64)?;
    write_raw_entry(storage, &RawDirEntry::unused())
}

fn write_entry_content(
    storage: &mut StorageEngine,
    dir_region: u16,
    offset: u64,
    new_content: u16,
) -> Result<()> {
    // Skip the 1-byte type code and 2-byte metadata region to reach the
    // content region field.
    storage.jump_to_region(dir_region)?;
    storage.seek_in_region(offset as i64 + 3)?;
    write_u16(storage, new_content)
}

fn read_file_length(storage: &mut StorageEngine, metadata_region: u16) -> Result<u64> {
    storage.jump_to_region(metadata_region)?;
    read_u64(storage)
}

fn write_file_length(storage: &mut StorageEngine, metadata_region: u16, length: u64) -> Result<()> {
    storage.jump_to_region(metadata_region)?;
    write_u64(storage, length)
}

/// Read a directory or file's name out of its metadata region, skipping
/// the length field files carry ahead of it.
fn read_entry_name(storage: &mut StorageEngine, entry_type: EntryType, metadata_region: u16) -> Result<String> {
    storage.jump_to_region(metadata_region)?;
    if entry_type == EntryType::File {
        read_u64(storage)?;
    }
    read_name(storage)
}

fn read_raw_entry(storage: &mut StorageEngine) -> Result<RawDirEntry> {
    let mut bytes = vec![0u8; *DIR_ENTRY_SIZE as usize];
    storage.read_in_region(&mut bytes)?;
    Ok(bincode::deserialize(&bytes)?)
}

fn write_raw_entry(storage: &mut StorageEngine, entry: &RawDirEntry) -> Result<()> {
    let bytes = bincode::serialize(entry)?;
    storage.write_in_region(&bytes)?;
    Ok(())
}

fn read_name(storage: &mut StorageEngine) -> Result<String> {
    let len = read_u8(storage)? as usize;
    let mut bytes = vec![0u8; len];
    storage.read_in_region(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| FsError::InvalidName("non UTF-8 name on disk".to_string()))
}

fn write_name(storage: &mut StorageEngine, name: &str) -> Result<()> {
    write_u8(storage, name.len() as u8)?;
    storage.write_in_region(name.as_bytes())?;
    Ok(())
}

fn read_u8(storage: &mut StorageEngine) -> Result<u8> {
    let mut bytes = [0u8; 1];
    storage.read_in_region(&mut bytes)?;
    Ok(bytes[0])
}

fn write_u8(storage: &mut StorageEngine, value: u8) -> Result<()> {
    storage.write_in_region(&[value])?;
    Ok(())
}

fn read_u64(storage: &mut StorageEngine) -> Result<u64> {
    let mut bytes = [0u8; 8];
    storage.read_in_region(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

fn write_u64(storage: &mut StorageEngine, value: u64) -> Result<()> {
    storage.write_in_region(&value.to_le_bytes())?;
    Ok(())
}

fn write_u16(storage: &mut StorageEngine, value: u16) -> Result<()> {
    storage.write_in_region(&value.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, remove_dir, remove_file};
    use std::path::PathBuf;

    fn image_path(name: &str) -> PathBuf {
        let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("fs-test-images-".to_string() + name);
        path.push("img");
        if path.exists() {
            remove_file(&path).unwrap();
        }
        create_dir_all(path.parent().unwrap()).unwrap();
        path
    }

    fn teardown(path: &Path) {
        if path.exists() {
            remove_file(path).unwrap();
        }
        let _ = remove_dir(path.parent().unwrap());
    }

    #[test]
    fn create_write_read_back() {
        let path = image_path("basic");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/hello.txt", OpenFlags::new().create(true)).unwrap();
        assert_eq!(fs.write(fd, b"hello world").unwrap(), 11);
        fs.seek(fd, SeekFrom::Start(0)).unwrap();

        let mut buf = [0u8; 11];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 11);
        assert_eq!(&buf, b"hello world");
        fs.close(fd).unwrap();

        teardown(&path);
    }

    #[test]
    fn open_without_create_fails_on_missing_path() {
        let path = image_path("missing");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();
        assert!(matches!(
            fs.open("/nope.txt", OpenFlags::new()),
            Err(FsError::NoSuchPath(_))
        ));
        teardown(&path);
    }

    #[test]
    fn exclusive_create_rejects_existing_file() {
        let path = image_path("exclusive");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/a.txt", OpenFlags::new().create(true)).unwrap();
        fs.close(fd).unwrap();

        let result = fs.open("/a.txt", OpenFlags::new().create(true).exclusive(true));
        assert!(matches!(result, Err(FsError::AlreadyExists(_))));
        teardown(&path);
    }

    #[test]
    fn truncate_resets_length_and_frees_old_content() {
        let path = image_path("truncate");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/t.txt", OpenFlags::new().create(true)).unwrap();
        fs.write(fd, b"some bytes here").unwrap();
        fs.close(fd).unwrap();

        let fd = fs
            .open("/t.txt", OpenFlags::new().create(true).truncate(true))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
        fs.write(fd, b"new").unwrap();
        fs.seek(fd, SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 3];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"new");

        teardown(&path);
    }

    #[test]
    fn append_positions_cursor_at_end() {
        let path = image_path("append");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/a.txt", OpenFlags::new().create(true)).unwrap();
        fs.write(fd, b"abc").unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("/a.txt", OpenFlags::new().append(true)).unwrap();
        fs.write(fd, b"def").unwrap();
        fs.seek(fd, SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 6];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");

        teardown(&path);
    }

    #[test]
    fn seek_clamps_within_bounds() {
        let path = image_path("seekclamp");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/s.txt", OpenFlags::new().create(true)).unwrap();
        fs.write(fd, b"0123456789").unwrap();

        assert_eq!(fs.seek(fd, SeekFrom::End(5)).unwrap(), 10);
        assert_eq!(fs.seek(fd, SeekFrom::Current(-100)).unwrap(), 0);
        assert_eq!(fs.seek(fd, SeekFrom::Start(4)).unwrap(), 4);

        teardown(&path);
    }

    #[test]
    fn mkdir_and_nested_file() {
        let path = image_path("nested");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        fs.mkdir("/docs").unwrap();
        let fd = fs
            .open("/docs/readme.txt", OpenFlags::new().create(true))
            .unwrap();
        fs.write(fd, b"contents").unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("/docs/readme.txt", OpenFlags::new()).unwrap();
        let mut buf = [0u8; 8];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"contents");

        teardown(&path);
    }

    #[test]
    fn rmdir_refuses_non_empty_directory() {
        let path = image_path("rmdir-nonempty");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        fs.mkdir("/docs").unwrap();
        let fd = fs
            .open("/docs/readme.txt", OpenFlags::new().create(true))
            .unwrap();
        fs.close(fd).unwrap();

        assert!(matches!(fs.rmdir("/docs"), Err(FsError::NotEmpty(_))));

        fs.unlink("/docs/readme.txt").unwrap();
        fs.rmdir("/docs").unwrap();
        assert!(matches!(
            fs.open("/docs/readme.txt", OpenFlags::new()),
            Err(FsError::NoSuchPath(_))
        ));

        teardown(&path);
    }

    #[test]
    fn unlink_frees_name_for_reuse() {
        let path = image_path("unlink");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd = fs.open("/x.txt", OpenFlags::new().create(true)).unwrap();
        fs.write(fd, b"first").unwrap();
        fs.close(fd).unwrap();
        fs.unlink("/x.txt").unwrap();

        let fd = fs.open("/x.txt", OpenFlags::new().create(true)).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);

        teardown(&path);
    }

    #[test]
    fn rejects_dot_and_dotdot_components() {
        let path = image_path("dotdot");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        assert!(matches!(
            fs.open("/a/../b.txt", OpenFlags::new().create(true)),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(
            fs.open("/./b.txt", OpenFlags::new().create(true)),
            Err(FsError::InvalidPath(_))
        ));

        teardown(&path);
    }

    #[test]
    fn cursor_affinity_survives_interleaved_descriptors() {
        let path = image_path("interleave");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        let fd_a = fs.open("/a.txt", OpenFlags::new().create(true)).unwrap();
        let fd_b = fs.open("/b.txt", OpenFlags::new().create(true)).unwrap();

        fs.write(fd_a, b"AAAA").unwrap();
        fs.write(fd_b, b"BBBB").unwrap();
        fs.seek(fd_a, SeekFrom::Start(0)).unwrap();
        fs.seek(fd_b, SeekFrom::Start(0)).unwrap();

        let mut buf_a = [0u8; 4];
        let mut buf_b = [0u8; 4];
        fs.read(fd_a, &mut buf_a).unwrap();
        fs.read(fd_b, &mut buf_b).unwrap();
        assert_eq!(&buf_a, b"AAAA");
        assert_eq!(&buf_b, b"BBBB");

        teardown(&path);
    }

    #[test]
    fn four_siblings_do_not_corrupt_each_other() {
        // block_size=16 is not a multiple of DIR_ENTRY_SIZE (5), so some
        // directory entries straddle a block boundary and read_in_region
        // returns short partway through find_free_slot's scan.
        let path = image_path("four-siblings");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        fs.mkdir("/a").unwrap();
        fs.mkdir("/b").unwrap();
        fs.mkdir("/c").unwrap();
        fs.mkdir("/d").unwrap();

        for name in ["/a", "/b", "/c", "/d"] {
            let fd = fs
                .open(&format!("{}/marker", name), OpenFlags::new().create(true))
                .unwrap();
            fs.write(fd, name.as_bytes()).unwrap();
            fs.close(fd).unwrap();
        }
        for name in ["/a", "/b", "/c", "/d"] {
            let fd = fs.open(&format!("{}/marker", name), OpenFlags::new()).unwrap();
            let mut buf = vec![0u8; name.len()];
            fs.read(fd, &mut buf).unwrap();
            assert_eq!(buf, name.as_bytes());
        }

        teardown(&path);
    }

    #[test]
    fn file_and_directory_may_share_a_name() {
        let path = image_path("shared-name");
        let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();

        fs.mkdir("/foo").unwrap();
        let fd = fs.open("/foo", OpenFlags::new().create(true)).unwrap();
        fs.write(fd, b"file content").unwrap();
        fs.close(fd).unwrap();

        let fd = fs.open("/foo", OpenFlags::new()).unwrap();
        let mut buf = [0u8; 12];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"file content");

        fs.mkdir("/foo/inside").unwrap();

        teardown(&path);
    }

    #[test]
    fn persists_across_remount() {
        let path = image_path("remount");
        {
            let mut fs = VirtualFileSystem::format(&path, 16, 64).unwrap();
            fs.mkdir("/docs").unwrap();
            let fd = fs
                .open("/docs/note.txt", OpenFlags::new().create(true))
                .unwrap();
            fs.write(fd, b"durable").unwrap();
        }

        {
            let mut fs = VirtualFileSystem::open_existing(&path).unwrap();
            let fd = fs.open("/docs/note.txt", OpenFlags::new()).unwrap();
            let mut buf = [0u8; 7];
            fs.read(fd, &mut buf).unwrap();
            assert_eq!(&buf, b"durable");
        }

        teardown(&path);
    }
}
