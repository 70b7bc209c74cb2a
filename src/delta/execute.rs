//! running a part's op stream against an object store
//!
//! objects are built in memory and checked against the part's declared
//! list as they close. nothing reaches the store until every op has run
//! and every object matched, so a corrupt part leaves the store untouched.

use tracing::{debug, trace};

use crate::cancel::{self, Cancellable};
use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::FileHeader;
use crate::store::{content_checksum, metadata_checksum, ObjectStore};
use crate::types::{mode, FileInfo, ObjectType};
use crate::validate::validate_file_mode;

use super::bspatch::bspatch;
use super::opcode::{Op, OpReader};
use super::part::{validate_part_with_limit, PartPayload, MAX_PART_SIZE};
use super::superblock::{PartMeta, PART_VERSION};

enum Staged {
    Metadata {
        objtype: ObjectType,
        data: Vec<u8>,
        checksum: Checksum,
    },
    File {
        header: FileHeader,
        content: Vec<u8>,
        checksum: Checksum,
    },
}

impl Staged {
    fn checksum(&self) -> Checksum {
        match self {
            Staged::Metadata { checksum, .. } | Staged::File { checksum, .. } => *checksum,
        }
    }

    /// bytes this object adds to the part's uncompressed size
    fn size(&self) -> u64 {
        match self {
            Staged::Metadata { data, .. } => data.len() as u64,
            Staged::File { content, .. } => content.len() as u64,
        }
    }
}

struct OpenFile {
    header: FileHeader,
    size: u64,
    content: Vec<u8>,
}

struct Executor<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    meta: &'a PartMeta,
    payload: &'a PartPayload,
    cancel: Option<&'a Cancellable>,
    next_object: usize,
    open: Option<OpenFile>,
    read_source: Option<Vec<u8>>,
    staged: Vec<Staged>,
}

fn span(data: &[u8], offset: u64, size: u64) -> Result<&[u8]> {
    let start = usize::try_from(offset).ok();
    let end = start.zip(usize::try_from(size).ok()).and_then(|(s, n)| s.checked_add(n));
    match (start, end) {
        (Some(start), Some(end)) if end <= data.len() => Ok(&data[start..end]),
        _ => Err(Error::corrupt_delta(format!(
            "span {}+{} out of range of {} bytes",
            offset,
            size,
            data.len()
        ))),
    }
}

impl<'a, S: ObjectStore + ?Sized> Executor<'a, S> {
    /// whether the next declared object is metadata, or none if all were produced
    fn pending_is_meta(&self) -> Option<bool> {
        self.meta
            .objects
            .get(self.next_object)
            .map(|(objtype, _)| objtype.is_meta())
    }

    fn header_for(&self, mode_idx: u64, xattr_idx: u64) -> Result<FileHeader> {
        let entry = usize::try_from(mode_idx)
            .ok()
            .and_then(|i| self.payload.modes.get(i))
            .ok_or_else(|| Error::corrupt_delta(format!("mode index {} out of range", mode_idx)))?;
        let xattrs = usize::try_from(xattr_idx)
            .ok()
            .and_then(|i| self.payload.xattrs.get(i))
            .ok_or_else(|| {
                Error::corrupt_delta(format!("xattr index {} out of range", xattr_idx))
            })?;
        validate_file_mode(entry.mode)?;
        let info = FileInfo {
            uid: entry.uid,
            gid: entry.gid,
            mode: entry.mode,
            rdev: 0,
            size: 0,
            symlink_target: String::new(),
        };
        Ok(FileHeader::new(info, xattrs.clone()))
    }

    /// compare a finished object with the next declared one and stage it
    fn finish_object(&mut self, object: Staged) -> Result<()> {
        let (objtype, expected) = self
            .meta
            .objects
            .get(self.next_object)
            .copied()
            .ok_or_else(|| Error::corrupt_delta("more objects than declared"))?;
        let produced = match &object {
            Staged::Metadata { objtype, .. } => *objtype,
            Staged::File { .. } => ObjectType::File,
        };
        if produced != objtype {
            return Err(Error::corrupt_delta(format!(
                "object {} is {}, declared {}",
                self.next_object,
                produced.as_str(),
                objtype.as_str()
            )));
        }
        let actual = object.checksum();
        if actual != expected {
            return Err(Error::CorruptObject { expected, actual });
        }
        trace!(index = self.next_object, checksum = %actual, "object verified");
        self.next_object += 1;
        self.staged.push(object);
        Ok(())
    }

    fn stage_file(&mut self, header: FileHeader, content: Vec<u8>) -> Result<()> {
        let checksum = content_checksum(&header, &content)?;
        self.finish_object(Staged::File {
            header,
            content,
            checksum,
        })
    }

    fn open_file(&mut self) -> Result<&mut OpenFile> {
        self.open
            .as_mut()
            .ok_or_else(|| Error::corrupt_delta("no object is open"))
    }

    fn append(&mut self, data: Vec<u8>) -> Result<()> {
        let open = self.open_file()?;
        if open.content.len() as u64 + data.len() as u64 > open.size {
            return Err(Error::corrupt_delta(format!(
                "write past declared size {}",
                open.size
            )));
        }
        open.content.extend_from_slice(&data);
        Ok(())
    }

    fn apply(&mut self, op: Op) -> Result<()> {
        trace!(op = %op, "applying");
        match op {
            Op::SpliceMeta { size, offset } => {
                if self.open.is_some() {
                    return Err(Error::corrupt_delta("splice while an object is open"));
                }
                let objtype = match self.meta.objects.get(self.next_object) {
                    Some((objtype, _)) => *objtype,
                    None => return Err(Error::corrupt_delta("more objects than declared")),
                };
                let data = span(&self.payload.raw, offset, size)?.to_vec();
                let checksum = metadata_checksum(objtype, &data)?;
                self.finish_object(Staged::Metadata {
                    objtype,
                    data,
                    checksum,
                })
            }
            Op::SpliceContent {
                mode_idx,
                xattr_idx,
                size,
                offset,
            } => {
                if self.open.is_some() {
                    return Err(Error::corrupt_delta("splice while an object is open"));
                }
                let mut header = self.header_for(mode_idx, xattr_idx)?;
                let data = span(&self.payload.raw, offset, size)?;
                if mode::is_lnk(header.info.mode) {
                    header.info.symlink_target = std::str::from_utf8(data)
                        .map_err(|_| Error::corrupt_delta("symlink target is not utf-8"))?
                        .to_string();
                    self.stage_file(header, Vec::new())
                } else {
                    header.info.size = size;
                    let content = data.to_vec();
                    self.stage_file(header, content)
                }
            }
            Op::Open {
                mode_idx,
                xattr_idx,
                size,
            } => {
                if self.open.is_some() {
                    return Err(Error::corrupt_delta("open while an object is open"));
                }
                match self.pending_is_meta() {
                    Some(false) => {}
                    Some(true) => {
                        return Err(Error::corrupt_delta("open of a metadata object"))
                    }
                    None => return Err(Error::corrupt_delta("more objects than declared")),
                }
                let mut header = self.header_for(mode_idx, xattr_idx)?;
                if !mode::is_reg(header.info.mode) {
                    return Err(Error::corrupt_delta("only regular files can be opened"));
                }
                header.info.size = size;
                self.open = Some(OpenFile {
                    header,
                    size,
                    content: Vec::with_capacity(size.min(MAX_PART_SIZE) as usize),
                });
                Ok(())
            }
            Op::Write { size, offset } => {
                let data = match &self.read_source {
                    Some(source) => span(source, offset, size)?.to_vec(),
                    None => span(&self.payload.raw, offset, size)?.to_vec(),
                };
                self.append(data)
            }
            Op::SetReadSource { offset } => {
                let raw = span(&self.payload.raw, offset, Checksum::LEN as u64)?;
                let checksum = Checksum::from_slice(raw)?;
                cancel::check(self.cancel)?;
                debug!(source = %checksum, "loading read source");
                let (_, content) = self.store.load_file(&checksum)?;
                self.read_source = Some(content);
                Ok(())
            }
            Op::UnsetReadSource => {
                self.read_source = None;
                Ok(())
            }
            Op::Bspatch { offset, size } => {
                let patch = span(&self.payload.raw, offset, size)?;
                let base = self
                    .read_source
                    .as_deref()
                    .ok_or_else(|| Error::corrupt_delta("bspatch without a read source"))?;
                let patched = bspatch(base, patch)?;
                self.append(patched)
            }
            Op::Close => {
                let open = self
                    .open
                    .take()
                    .ok_or_else(|| Error::corrupt_delta("close without open"))?;
                if open.content.len() as u64 != open.size {
                    return Err(Error::corrupt_delta(format!(
                        "object closed at {} bytes, declared {}",
                        open.content.len(),
                        open.size
                    )));
                }
                self.stage_file(open.header, open.content)
            }
        }
    }

    fn run(mut self) -> Result<Vec<Checksum>> {
        let mut reader = OpReader::new(&self.payload.ops);
        while let Some(op) = reader.next_op(self.pending_is_meta())? {
            self.apply(op)?;
        }
        if self.open.is_some() {
            return Err(Error::corrupt_delta("part ended with an object open"));
        }
        if self.next_object != self.meta.objects.len() {
            return Err(Error::corrupt_delta(format!(
                "part produced {} of {} declared objects",
                self.next_object,
                self.meta.objects.len()
            )));
        }
        let produced: u64 = self.staged.iter().map(Staged::size).sum();
        if produced != self.meta.usize {
            return Err(Error::corrupt_delta(format!(
                "part produced {} object bytes, declared {}",
                produced, self.meta.usize
            )));
        }

        let mut written = Vec::with_capacity(self.staged.len());
        for object in self.staged {
            cancel::check(self.cancel)?;
            let checksum = match object {
                Staged::Metadata {
                    objtype,
                    data,
                    checksum,
                } => self.store.write_metadata(objtype, &data, Some(&checksum))?,
                Staged::File {
                    header,
                    content,
                    checksum,
                } => self.store.write_file(&header, &content, Some(&checksum))?,
            };
            written.push(checksum);
        }
        Ok(written)
    }
}

/// run a decoded part, writing its objects to `store` only if all of them
/// verify against `meta`
pub fn execute_part<S: ObjectStore + ?Sized>(
    store: &S,
    meta: &PartMeta,
    payload: &PartPayload,
    cancel: Option<&Cancellable>,
) -> Result<Vec<Checksum>> {
    if meta.version != PART_VERSION {
        return Err(Error::corrupt_delta(format!(
            "unsupported part version {}",
            meta.version
        )));
    }
    debug!(part = %meta.checksum, objects = meta.objects.len(), "executing delta part");
    Executor {
        store,
        meta,
        payload,
        cancel,
        next_object: 0,
        open: None,
        read_source: None,
        staged: Vec::new(),
    }
    .run()
}

/// validate, decode and run an on-wire part
pub fn apply_part<S: ObjectStore + ?Sized>(
    store: &S,
    meta: &PartMeta,
    data: &[u8],
    max_size: u64,
    cancel: Option<&Cancellable>,
) -> Result<Vec<Checksum>> {
    if data.len() as u64 != meta.size {
        return Err(Error::corrupt_delta(format!(
            "part is {} bytes, declared {}",
            data.len(),
            meta.size
        )));
    }
    validate_part_with_limit(data, &meta.checksum, max_size)?;
    let payload = PartPayload::from_part_bytes_with_limit(data, max_size)?;
    execute_part(store, meta, &payload, cancel)
}

/// whether every object the part produces is already in `store`
pub fn have_all_objects<S: ObjectStore + ?Sized>(store: &S, meta: &PartMeta) -> Result<bool> {
    for (objtype, checksum) in &meta.objects {
        if !store.has_object(*objtype, checksum)? {
            return Ok(false);
        }
    }
    Ok(true)
}
