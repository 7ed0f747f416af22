//! Structural validation of the virtual-filesystem command responses: the
//! only `Command` subtype whose payload this crate parses rather than
//! passing through opaquely, because the response is otherwise handed back
//! to the caller as an unchecked, potentially self-referential blob from an
//! untrusted remote.

use byteorder::{NativeEndian, ReadBytesExt};
use std::io::Cursor;

use crate::Error;

/// `fCMD` values that carry a VFS response subject to [`verify_vfs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsCommand {
    /// List a directory; response carries a [`FileListBlob`].
    List,
    /// Read file bytes.
    Read,
    /// Write file bytes.
    Write,
}

impl VfsCommand {
    /// Classify `fcmd`, returning `None` if it is not a VFS command this
    /// crate validates (any other command's response passes through
    /// unchecked).
    pub fn from_fcmd(fcmd: u64) -> Option<Self> {
        use crate::session::{FCMD_AGENT_VFS_LIST, FCMD_AGENT_VFS_READ, FCMD_AGENT_VFS_WRITE};
        match fcmd {
            FCMD_AGENT_VFS_LIST => Some(Self::List),
            FCMD_AGENT_VFS_READ => Some(Self::Read),
            FCMD_AGENT_VFS_WRITE => Some(Self::Write),
            _ => None,
        }
    }
}

/// Constant version stamped into every `AgentVfsRsp` and checked on receipt.
pub const AGENT_VFS_RSP_VERSION: u32 = 1;

const AGENT_VFS_RSP_HEADER_LEN: usize = 4 + 4 + 4; // version, cbReadWrite, inner cb

/// The common envelope wrapping every VFS command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentVfsRsp {
    /// Bytes actually read or written (meaningful for `Read`/`Write`).
    pub cb_read_write: u32,
    /// The inner, command-specific payload.
    pub inner: Vec<u8>,
}

impl AgentVfsRsp {
    fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < AGENT_VFS_RSP_HEADER_LEN {
            return Err(Error::InvalidVfsResponse);
        }
        let mut c = Cursor::new(buf);
        let version = c.read_u32::<NativeEndian>()?;
        if version != AGENT_VFS_RSP_VERSION {
            return Err(Error::InvalidVfsResponse);
        }
        let cb_read_write = c.read_u32::<NativeEndian>()?;
        let inner_cb = c.read_u32::<NativeEndian>()?;

        if buf.len() != AGENT_VFS_RSP_HEADER_LEN + inner_cb as usize {
            return Err(Error::InvalidVfsResponse);
        }

        Ok(Self {
            cb_read_write,
            inner: buf[AGENT_VFS_RSP_HEADER_LEN..].to_vec(),
        })
    }
}

/// Constant version stamped into a `FileListBlob` and checked on receipt.
pub const FILELISTBLOB_VERSION: u32 = 0xf88f_0001;

const FILELISTBLOB_HEADER_LEN: usize = 4 + 4 + 4 + 4; // version, cbStruct, cFileEntry, cbMultiText
const FILELISTBLOB_ENTRY_LEN: usize = 8 + 8 + 32; // ouszName, cbFileSize, opaque ExInfo

/// A single entry in a [`FileListBlob`]: a name (as a byte offset into the
/// blob's trailing text arena) and a size, or `u64::MAX` for a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    /// Byte offset of this entry's NUL-terminated name within
    /// [`FileListBlob::multi_text`], rewritten by [`verify_vfs`] from an
    /// offset relative to the start of the blob into one relative to the
    /// text arena.
    pub name_offset: u64,
    /// File size in bytes, or `u64::MAX` to indicate a directory.
    pub file_size: u64,
}

/// A validated directory listing: entries plus the shared text arena their
/// `name_offset` fields index into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListBlob {
    /// The listed entries.
    pub entries: Vec<FileListEntry>,
    /// The concatenated, NUL-separated entry names.
    pub multi_text: Vec<u8>,
}

impl FileListBlob {
    /// Look up an entry's name as a `&str`, given the blob it came from.
    pub fn name(&self, entry: &FileListEntry) -> Result<&str, Error> {
        let start = entry.name_offset as usize;
        let end = self.multi_text[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .ok_or(Error::InvalidVfsResponse)?;
        std::str::from_utf8(&self.multi_text[start..end]).map_err(|_| Error::InvalidVfsResponse)
    }

    fn parse(inner: &[u8]) -> Result<Self, Error> {
        if inner.len() < FILELISTBLOB_HEADER_LEN {
            return Err(Error::InvalidVfsResponse);
        }
        if *inner.last().unwrap() != 0 {
            return Err(Error::InvalidVfsResponse);
        }

        let mut c = Cursor::new(inner);
        let version = c.read_u32::<NativeEndian>()?;
        let cb_struct = c.read_u32::<NativeEndian>()?;
        let c_file_entry = c.read_u32::<NativeEndian>()?;
        let cb_multi_text = c.read_u32::<NativeEndian>()?;

        if version != FILELISTBLOB_VERSION {
            return Err(Error::InvalidVfsResponse);
        }
        if inner.len() as u32 != cb_struct || cb_multi_text == 0 {
            return Err(Error::InvalidVfsResponse);
        }

        let entries_len = c_file_entry as usize * FILELISTBLOB_ENTRY_LEN;
        let wanted_len =
            FILELISTBLOB_HEADER_LEN as u64 + entries_len as u64 + cb_multi_text as u64;
        if inner.len() as u64 != wanted_len {
            return Err(Error::InvalidVfsResponse);
        }

        let entries_start = FILELISTBLOB_HEADER_LEN;
        let text_start = entries_start + entries_len;
        if inner[text_start] != 0 {
            return Err(Error::InvalidVfsResponse);
        }

        let mut entries = Vec::with_capacity(c_file_entry as usize);
        let mut ec = Cursor::new(&inner[entries_start..entries_start + entries_len]);
        for _ in 0..c_file_entry {
            let ouszname = ec.read_u64::<NativeEndian>()?;
            let cb_file_size = ec.read_u64::<NativeEndian>()?;
            let mut ex_info = [0u8; 32];
            std::io::Read::read_exact(&mut ec, &mut ex_info)?;
            let _ = ex_info;

            if ouszname >= cb_multi_text as u64 {
                return Err(Error::InvalidVfsResponse);
            }
            entries.push(FileListEntry {
                name_offset: ouszname,
                file_size: cb_file_size,
            });
        }

        let multi_text = inner[text_start..].to_vec();

        Ok(Self {
            entries,
            multi_text,
        })
    }
}

/// Structural result of validating a VFS command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsResult {
    /// A validated read or write; no further structure to inspect.
    Plain(AgentVfsRsp),
    /// A validated directory listing.
    List(FileListBlob),
}

/// Structurally validate a raw `Command` response payload known to be for
/// `cmd`, per the untrusted-remote checks described for VFS responses.
///
/// Any structural inconsistency is reported as [`Error::InvalidVfsResponse`]
/// rather than trusted and handed to the caller.
pub fn verify_vfs(cmd: VfsCommand, payload: &[u8]) -> Result<VfsResult, Error> {
    let rsp = AgentVfsRsp::parse(payload)?;

    match cmd {
        VfsCommand::Read => {
            if rsp.cb_read_write as usize != rsp.inner.len() {
                return Err(Error::InvalidVfsResponse);
            }
            Ok(VfsResult::Plain(rsp))
        }
        VfsCommand::Write => {
            if !rsp.inner.is_empty() {
                return Err(Error::InvalidVfsResponse);
            }
            Ok(VfsResult::Plain(rsp))
        }
        VfsCommand::List => {
            let blob = FileListBlob::parse(&rsp.inner)?;
            Ok(VfsResult::List(blob))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;

    fn encode_vfs_rsp(cb_read_write: u32, inner: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<NativeEndian>(AGENT_VFS_RSP_VERSION).unwrap();
        buf.write_u32::<NativeEndian>(cb_read_write).unwrap();
        buf.write_u32::<NativeEndian>(inner.len() as u32).unwrap();
        buf.write_all(inner).unwrap();
        buf
    }

    fn encode_filelistblob(entries: &[(u64, u64)], names: &[&str]) -> Vec<u8> {
        // Offset 0 in the text arena is always a NUL sentinel; real names
        // start at offset 1.
        let mut multi_text = vec![0u8];
        let mut offsets = Vec::new();
        for name in names {
            offsets.push(multi_text.len() as u64);
            multi_text.extend_from_slice(name.as_bytes());
            multi_text.push(0);
        }

        let c_file_entry = entries.len() as u32;
        let cb_multi_text = multi_text.len() as u32;
        let cb_struct = FILELISTBLOB_HEADER_LEN as u32
            + c_file_entry * FILELISTBLOB_ENTRY_LEN as u32
            + cb_multi_text;

        let mut buf = Vec::new();
        buf.write_u32::<NativeEndian>(FILELISTBLOB_VERSION).unwrap();
        buf.write_u32::<NativeEndian>(cb_struct).unwrap();
        buf.write_u32::<NativeEndian>(c_file_entry).unwrap();
        buf.write_u32::<NativeEndian>(cb_multi_text).unwrap();
        for (i, (_, size)) in entries.iter().enumerate() {
            buf.write_u64::<NativeEndian>(offsets[i]).unwrap();
            buf.write_u64::<NativeEndian>(*size).unwrap();
            buf.extend_from_slice(&[0u8; 32]);
        }
        buf.extend_from_slice(&multi_text);
        buf
    }

    #[test]
    fn test_verify_vfs_read_ok() {
        let payload = encode_vfs_rsp(4, &[1, 2, 3, 4]);
        let result = verify_vfs(VfsCommand::Read, &payload).unwrap();
        assert!(matches!(result, VfsResult::Plain(_)));
    }

    #[test]
    fn test_verify_vfs_read_rejects_size_mismatch() {
        let payload = encode_vfs_rsp(3, &[1, 2, 3, 4]);
        assert_eq!(
            verify_vfs(VfsCommand::Read, &payload),
            Err(Error::InvalidVfsResponse)
        );
    }

    #[test]
    fn test_verify_vfs_write_ok() {
        let payload = encode_vfs_rsp(0, &[]);
        let result = verify_vfs(VfsCommand::Write, &payload).unwrap();
        assert!(matches!(result, VfsResult::Plain(_)));
    }

    #[test]
    fn test_verify_vfs_write_rejects_nonempty_inner() {
        let payload = encode_vfs_rsp(0, &[9]);
        assert_eq!(
            verify_vfs(VfsCommand::Write, &payload),
            Err(Error::InvalidVfsResponse)
        );
    }

    #[test]
    fn test_verify_vfs_list_ok() {
        let blob = encode_filelistblob(&[(0, 123), (0, u64::MAX)], &["a.txt", "subdir"]);
        let payload = encode_vfs_rsp(0, &blob);

        let result = verify_vfs(VfsCommand::List, &payload).unwrap();
        match result {
            VfsResult::List(parsed) => {
                assert_eq!(parsed.entries.len(), 2);
                assert_eq!(parsed.name(&parsed.entries[0]).unwrap(), "a.txt");
                assert_eq!(parsed.name(&parsed.entries[1]).unwrap(), "subdir");
                assert_eq!(parsed.entries[1].file_size, u64::MAX);
            }
            _ => panic!("expected List"),
        }
    }

    #[test]
    fn test_verify_vfs_list_rejects_out_of_range_name_offset() {
        let mut blob = encode_filelistblob(&[(0, 1)], &["a"]);
        // stomp the single entry's name offset to point past the text arena
        blob[FILELISTBLOB_HEADER_LEN..FILELISTBLOB_HEADER_LEN + 8]
            .copy_from_slice(&999u64.to_ne_bytes());
        let payload = encode_vfs_rsp(0, &blob);
        assert_eq!(
            verify_vfs(VfsCommand::List, &payload),
            Err(Error::InvalidVfsResponse)
        );
    }

    #[test]
    fn test_verify_vfs_list_rejects_bad_version() {
        let mut blob = encode_filelistblob(&[], &["only"]);
        blob[0..4].copy_from_slice(&0u32.to_ne_bytes());
        let payload = encode_vfs_rsp(0, &blob);
        assert_eq!(
            verify_vfs(VfsCommand::List, &payload),
            Err(Error::InvalidVfsResponse)
        );
    }
}
