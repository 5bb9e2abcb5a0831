//! Production filesystem backend
//!
//! Win32 implementation of the [`Filesystem`] trait. Every open uses
//! `FILE_FLAG_BACKUP_SEMANTICS` (directory handles allowed, ACL checks
//! bypassed under backup/restore privileges) and
//! `FILE_FLAG_OPEN_REPARSE_POINT` (the reparse point itself is opened,
//! never its target). All paths go through the verbatim-prefix wrapper so
//! long paths and literal trailing dots/spaces survive.
//!
//! Reparse buffers are packed and parsed by hand: their layout lives in
//! ntifs.h and is not exposed by `windows-sys`.

use std::ffi::c_void;
use std::ptr;

use filetime::FileTime;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_NOT_A_REPARSE_POINT, ERROR_NO_MORE_FILES, FILETIME, HANDLE,
    INVALID_HANDLE_VALUE, LUID,
};
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, GetFileSecurityW, LookupPrivilegeValueW, SetFileSecurityW,
    DACL_SECURITY_INFORMATION, GROUP_SECURITY_INFORMATION, LUID_AND_ATTRIBUTES,
    OWNER_SECURITY_INFORMATION, SACL_SECURITY_INFORMATION, SE_PRIVILEGE_ENABLED,
    TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateDirectoryW, CreateFileW, DeleteFileW, FindClose, FindFirstFileW, FindNextFileW,
    GetFileAttributesW, GetFileInformationByHandleEx, GetFileSizeEx, MoveFileExW, ReadFile,
    RemoveDirectoryW, SetFileAttributesW, SetFileInformationByHandle, WriteFile, CREATE_NEW,
    FILE_ATTRIBUTE_READONLY, FILE_BASIC_INFO, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OPEN_REPARSE_POINT, FILE_READ_ATTRIBUTES, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, FILE_WRITE_ATTRIBUTES, FileBasicInfo, INVALID_FILE_ATTRIBUTES,
    MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, OPEN_EXISTING, WIN32_FIND_DATAW,
};
use windows_sys::Win32::System::Ioctl::{
    FSCTL_DELETE_REPARSE_POINT, FSCTL_GET_REPARSE_POINT, FSCTL_SET_REPARSE_POINT,
    MAXIMUM_REPARSE_DATA_BUFFER_SIZE,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows_sys::Win32::System::IO::DeviceIoControl;

use crate::error::{MirrorError, Result};
use crate::fs::{
    AttributeFlags, CopyProgress, DirEntry, FileAttributes, Filesystem, ReparseData,
    COPY_CHUNK_SIZE, REPARSE_TAG_MOUNT_POINT, REPARSE_TAG_SYMLINK,
};
use crate::path_util;

const GENERIC_READ: u32 = 0x8000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn wide_path(path: &str) -> Vec<u16> {
    wide(&path_util::long_form(path))
}

fn last_error(path: &str) -> MirrorError {
    MirrorError::from_io(path, &std::io::Error::last_os_error())
}

fn filetime_from_ticks(ticks: i64) -> FileTime {
    let secs = ticks.div_euclid(10_000_000) - FILETIME_UNIX_OFFSET_SECS;
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    FileTime::from_unix_time(secs, nanos)
}

fn ticks_from_filetime(t: FileTime) -> i64 {
    (t.unix_seconds() + FILETIME_UNIX_OFFSET_SECS) * 10_000_000 + i64::from(t.nanoseconds()) / 100
}

fn filetime_from_win(ft: &FILETIME) -> FileTime {
    let ticks = (i64::from(ft.dwHighDateTime) << 32) | i64::from(ft.dwLowDateTime);
    filetime_from_ticks(ticks)
}

/// Scoped handle; closed on drop.
struct Handle(HANDLE);

impl Handle {
    fn open(path: &str, access: u32, disposition: u32) -> Result<Self> {
        let raw = unsafe {
            CreateFileW(
                wide_path(path).as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                ptr::null(),
                disposition,
                FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OPEN_REPARSE_POINT,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            Err(last_error(path))
        } else {
            Ok(Self(raw))
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn read_basic_info(path: &str, handle: &Handle) -> Result<FILE_BASIC_INFO> {
    let mut info: FILE_BASIC_INFO = unsafe { std::mem::zeroed() };
    let ok = unsafe {
        GetFileInformationByHandleEx(
            handle.0,
            FileBasicInfo,
            ptr::addr_of_mut!(info).cast(),
            std::mem::size_of::<FILE_BASIC_INFO>() as u32,
        )
    };
    if ok == 0 {
        Err(last_error(path))
    } else {
        Ok(info)
    }
}

// ----------------------------------------------------------------------
// Reparse buffer packing
//
// Header: ReparseTag u32, ReparseDataLength u16, Reserved u16. Mount-point
// data: four u16 name offsets/lengths, then the path buffer. Symlink data:
// the same four, then Flags u32, then the path buffer. Names are UTF-16,
// NUL-separated, offsets/lengths in bytes relative to the path buffer.
// ----------------------------------------------------------------------

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn get_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn utf16_bytes(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn pack_reparse_buffer(data: &ReparseData) -> Result<Vec<u8>> {
    let substitute = utf16_bytes(&data.substitute_name);
    let print = utf16_bytes(&data.print_name);
    let is_symlink = data.tag == REPARSE_TAG_SYMLINK;
    let header_len: usize = if is_symlink { 12 } else { 8 };
    let path_buffer_len = substitute.len() + 2 + print.len() + 2;
    let data_len = header_len + path_buffer_len;
    if data_len + 8 > MAXIMUM_REPARSE_DATA_BUFFER_SIZE as usize {
        return Err(MirrorError::io(&data.print_name, "reparse target too long"));
    }

    let mut buf = Vec::with_capacity(data_len + 8);
    put_u32(&mut buf, data.tag);
    put_u16(&mut buf, data_len as u16);
    put_u16(&mut buf, 0); // Reserved
    put_u16(&mut buf, 0); // SubstituteNameOffset
    put_u16(&mut buf, substitute.len() as u16);
    put_u16(&mut buf, (substitute.len() + 2) as u16); // PrintNameOffset
    put_u16(&mut buf, print.len() as u16);
    if is_symlink {
        put_u32(&mut buf, data.symlink_flags);
    }
    buf.extend_from_slice(&substitute);
    put_u16(&mut buf, 0);
    buf.extend_from_slice(&print);
    put_u16(&mut buf, 0);
    Ok(buf)
}

fn utf16_name(buf: &[u8], base: usize, offset: u16, len: u16) -> String {
    let start = base + offset as usize;
    let end = start + len as usize;
    let units: Vec<u16> = buf[start..end]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn parse_reparse_buffer(buf: &[u8]) -> ReparseData {
    let tag = get_u32(buf, 0);
    match tag {
        REPARSE_TAG_MOUNT_POINT => {
            let path_buffer = 16;
            ReparseData {
                tag,
                substitute_name: utf16_name(buf, path_buffer, get_u16(buf, 8), get_u16(buf, 10)),
                print_name: utf16_name(buf, path_buffer, get_u16(buf, 12), get_u16(buf, 14)),
                symlink_flags: 0,
            }
        }
        REPARSE_TAG_SYMLINK => {
            let path_buffer = 20;
            ReparseData {
                tag,
                substitute_name: utf16_name(buf, path_buffer, get_u16(buf, 8), get_u16(buf, 10)),
                print_name: utf16_name(buf, path_buffer, get_u16(buf, 12), get_u16(buf, 14)),
                symlink_flags: get_u32(buf, 16),
            }
        }
        // Foreign tag: surface it with empty names so classification can
        // reject it by tag.
        _ => ReparseData {
            tag,
            substitute_name: String::new(),
            print_name: String::new(),
            symlink_flags: 0,
        },
    }
}

/// Win32-backed [`Filesystem`].
#[derive(Debug, Default)]
pub struct WindowsFilesystem;

impl WindowsFilesystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn set_reparse(&self, path: &str, data: &ReparseData) -> Result<()> {
        let existing = self.get_reparse_data(path)?;
        match (&existing, data.tag) {
            (Some(r), REPARSE_TAG_MOUNT_POINT) if r.tag == REPARSE_TAG_SYMLINK => {
                return Err(MirrorError::io(path, "existing symlink in the way"));
            }
            (Some(r), REPARSE_TAG_SYMLINK) if r.tag == REPARSE_TAG_MOUNT_POINT => {
                return Err(MirrorError::io(path, "existing junction in the way"));
            }
            _ => {}
        }
        let buf = pack_reparse_buffer(data)?;
        let handle = Handle::open(path, GENERIC_WRITE, OPEN_EXISTING)?;
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_SET_REPARSE_POINT,
                buf.as_ptr().cast(),
                buf.len() as u32,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }

    fn delete_reparse(&self, path: &str, expected_tag: u32) -> Result<()> {
        let existing = self.get_reparse_data(path)?;
        match existing {
            Some(r) if r.tag == expected_tag => {}
            _ => return Err(MirrorError::io(path, "reparse tag mismatch")),
        }
        // FSCTL_DELETE_REPARSE_POINT takes just the 8-byte header with a
        // zero data length.
        let mut buf = Vec::with_capacity(8);
        put_u32(&mut buf, expected_tag);
        put_u16(&mut buf, 0);
        put_u16(&mut buf, 0);
        let handle = Handle::open(path, GENERIC_WRITE, OPEN_EXISTING)?;
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_DELETE_REPARSE_POINT,
                buf.as_ptr().cast(),
                buf.len() as u32,
                ptr::null_mut(),
                0,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }

    fn clear_readonly(&self, path: &str) -> Result<()> {
        let attrs = unsafe { GetFileAttributesW(wide_path(path).as_ptr()) };
        if attrs == INVALID_FILE_ATTRIBUTES {
            return Err(last_error(path));
        }
        if attrs & FILE_ATTRIBUTE_READONLY != 0 {
            let ok = unsafe {
                SetFileAttributesW(wide_path(path).as_ptr(), attrs & !FILE_ATTRIBUTE_READONLY)
            };
            if ok == 0 {
                return Err(last_error(path));
            }
        }
        Ok(())
    }
}

impl Filesystem for WindowsFilesystem {
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let pattern = wide(&path_util::join(&path_util::long_form(path), "*"));
        let mut data: WIN32_FIND_DATAW = unsafe { std::mem::zeroed() };
        let find = unsafe { FindFirstFileW(pattern.as_ptr(), &mut data) };
        if find == INVALID_HANDLE_VALUE {
            return Err(last_error(path));
        }
        let mut entries = Vec::new();
        loop {
            let name_len = data
                .cFileName
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(data.cFileName.len());
            let name = String::from_utf16_lossy(&data.cFileName[..name_len]);
            if name != "." && name != ".." {
                let write = filetime_from_win(&data.ftLastWriteTime);
                entries.push(DirEntry {
                    attrs: FileAttributes {
                        creation: filetime_from_win(&data.ftCreationTime),
                        access: filetime_from_win(&data.ftLastAccessTime),
                        write,
                        // The enumeration API exposes no change time; the
                        // write time stands in and set_attributes never
                        // writes a change time back.
                        change: write,
                        flags: AttributeFlags::from_bits_truncate(data.dwFileAttributes),
                    },
                    length: (u64::from(data.nFileSizeHigh) << 32) | u64::from(data.nFileSizeLow),
                    name,
                });
            }
            let more = unsafe { FindNextFileW(find, &mut data) };
            if more == 0 {
                let err = unsafe { GetLastError() };
                unsafe { FindClose(find) };
                if err == ERROR_NO_MORE_FILES {
                    return Ok(entries);
                }
                return Err(last_error(path));
            }
        }
    }

    fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        let handle = Handle::open(path, FILE_READ_ATTRIBUTES, OPEN_EXISTING)?;
        let info = read_basic_info(path, &handle)?;
        Ok(FileAttributes {
            creation: filetime_from_ticks(info.CreationTime),
            access: filetime_from_ticks(info.LastAccessTime),
            write: filetime_from_ticks(info.LastWriteTime),
            change: filetime_from_ticks(info.ChangeTime),
            flags: AttributeFlags::from_bits_truncate(info.FileAttributes),
        })
    }

    fn set_attributes(&self, path: &str, attrs: &FileAttributes) -> Result<()> {
        let handle = Handle::open(path, FILE_WRITE_ATTRIBUTES, OPEN_EXISTING)?;
        let info = FILE_BASIC_INFO {
            CreationTime: ticks_from_filetime(attrs.creation),
            LastAccessTime: ticks_from_filetime(attrs.access),
            LastWriteTime: ticks_from_filetime(attrs.write),
            // Zero means "leave unchanged"; change times are not settable
            // in any portable way.
            ChangeTime: 0,
            FileAttributes: (attrs.flags
                - (AttributeFlags::DIRECTORY | AttributeFlags::REPARSE_POINT))
                .bits(),
        };
        let ok = unsafe {
            SetFileInformationByHandle(
                handle.0,
                FileBasicInfo,
                ptr::addr_of!(info).cast(),
                std::mem::size_of::<FILE_BASIC_INFO>() as u32,
            )
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }

    fn file_length(&self, path: &str) -> Result<u64> {
        let handle = Handle::open(path, FILE_READ_ATTRIBUTES, OPEN_EXISTING)?;
        let mut size = 0i64;
        let ok = unsafe { GetFileSizeEx(handle.0, &mut size) };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(size as u64)
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.clear_readonly(path)?;
        let attrs = unsafe { GetFileAttributesW(wide_path(path).as_ptr()) };
        if attrs == INVALID_FILE_ATTRIBUTES {
            return Err(last_error(path));
        }
        let ok = if attrs & AttributeFlags::DIRECTORY.bits() != 0 {
            unsafe { RemoveDirectoryW(wide_path(path).as_ptr()) }
        } else {
            unsafe { DeleteFileW(wide_path(path).as_ptr()) }
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }

    fn rename(&self, old_path: &str, new_path: &str, overwrite: bool) -> Result<()> {
        let mut flags = MOVEFILE_WRITE_THROUGH;
        if overwrite {
            flags |= MOVEFILE_REPLACE_EXISTING;
            // The replace refuses a read-only target; the contract says the
            // bit is ignored.
            let attrs = unsafe { GetFileAttributesW(wide_path(new_path).as_ptr()) };
            if attrs != INVALID_FILE_ATTRIBUTES && attrs & FILE_ATTRIBUTE_READONLY != 0 {
                self.clear_readonly(new_path)?;
            }
        }
        let ok = unsafe {
            MoveFileExW(
                wide_path(old_path).as_ptr(),
                wide_path(new_path).as_ptr(),
                flags,
            )
        };
        if ok == 0 {
            Err(last_error(new_path))
        } else {
            Ok(())
        }
    }

    fn copy_file_content(
        &self,
        src: &str,
        dst: &str,
        progress: &mut dyn FnMut(CopyProgress),
    ) -> Result<()> {
        let src_handle = Handle::open(src, GENERIC_READ, OPEN_EXISTING)?;
        let mut total = 0i64;
        if unsafe { GetFileSizeEx(src_handle.0, &mut total) } == 0 {
            return Err(last_error(src));
        }
        let total = total as u64;
        let dst_handle = Handle::open(dst, GENERIC_WRITE, CREATE_NEW)?;

        progress(CopyProgress { total, copied: 0 });
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let mut read = 0u32;
            let ok = unsafe {
                ReadFile(
                    src_handle.0,
                    buf.as_mut_ptr().cast(),
                    buf.len() as u32,
                    &mut read,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(last_error(src));
            }
            if read == 0 {
                break;
            }
            let mut written = 0u32;
            let ok = unsafe {
                WriteFile(
                    dst_handle.0,
                    buf.as_ptr().cast(),
                    read,
                    &mut written,
                    ptr::null_mut(),
                )
            };
            if ok == 0 || written != read {
                return Err(last_error(dst));
            }
            copied += u64::from(written);
            progress(CopyProgress { total, copied });
        }
        if copied == 0 {
            progress(CopyProgress { total, copied });
        }
        Ok(())
    }

    fn create_empty_file(&self, path: &str) -> Result<()> {
        Handle::open(path, GENERIC_WRITE, CREATE_NEW).map(|_| ())
    }

    fn create_directory(&self, path: &str) -> Result<()> {
        let ok = unsafe { CreateDirectoryW(wide_path(path).as_ptr(), ptr::null()) };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        let handle = Handle::open(path, GENERIC_READ, OPEN_EXISTING)?;
        let mut out = Vec::new();
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let mut read = 0u32;
            let ok = unsafe {
                ReadFile(
                    handle.0,
                    buf.as_mut_ptr().cast(),
                    buf.len() as u32,
                    &mut read,
                    ptr::null_mut(),
                )
            };
            if ok == 0 {
                return Err(last_error(path));
            }
            if read == 0 {
                break;
            }
            out.extend_from_slice(&buf[..read as usize]);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn get_reparse_data(&self, path: &str) -> Result<Option<ReparseData>> {
        let handle = Handle::open(path, FILE_READ_ATTRIBUTES, OPEN_EXISTING)?;
        let mut buf = vec![0u8; MAXIMUM_REPARSE_DATA_BUFFER_SIZE as usize];
        let mut returned = 0u32;
        let ok = unsafe {
            DeviceIoControl(
                handle.0,
                FSCTL_GET_REPARSE_POINT,
                ptr::null(),
                0,
                buf.as_mut_ptr().cast(),
                buf.len() as u32,
                &mut returned,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            let err = unsafe { GetLastError() };
            if err == ERROR_NOT_A_REPARSE_POINT {
                return Ok(None);
            }
            return Err(last_error(path));
        }
        Ok(Some(parse_reparse_buffer(&buf)))
    }

    fn set_junction_data(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
    ) -> Result<()> {
        self.set_reparse(path, &ReparseData::junction(substitute_name, print_name))
    }

    fn set_symlink_data(
        &self,
        path: &str,
        substitute_name: &str,
        print_name: &str,
        relative: bool,
    ) -> Result<()> {
        self.set_reparse(
            path,
            &ReparseData::symlink(substitute_name, print_name, relative),
        )
    }

    fn delete_junction_data(&self, path: &str) -> Result<()> {
        self.delete_reparse(path, REPARSE_TAG_MOUNT_POINT)
    }

    fn delete_symlink_data(&self, path: &str) -> Result<()> {
        self.delete_reparse(path, REPARSE_TAG_SYMLINK)
    }

    fn get_security_descriptor(&self, path: &str, _is_dir: bool) -> Result<Vec<u8>> {
        let info = OWNER_SECURITY_INFORMATION
            | GROUP_SECURITY_INFORMATION
            | DACL_SECURITY_INFORMATION
            | SACL_SECURITY_INFORMATION;
        let wide_name = wide_path(path);
        let mut needed = 0u32;
        unsafe {
            GetFileSecurityW(wide_name.as_ptr(), info, ptr::null_mut(), 0, &mut needed);
        }
        if needed == 0 {
            return Err(last_error(path));
        }
        let mut buf = vec![0u8; needed as usize];
        let ok = unsafe {
            GetFileSecurityW(
                wide_name.as_ptr(),
                info,
                buf.as_mut_ptr().cast(),
                needed,
                &mut needed,
            )
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(buf)
        }
    }

    fn set_security_descriptor(&self, path: &str, _is_dir: bool, descriptor: &[u8]) -> Result<()> {
        let info = OWNER_SECURITY_INFORMATION
            | GROUP_SECURITY_INFORMATION
            | DACL_SECURITY_INFORMATION
            | SACL_SECURITY_INFORMATION;
        let ok = unsafe {
            SetFileSecurityW(
                wide_path(path).as_ptr(),
                info,
                descriptor.as_ptr().cast(),
            )
        };
        if ok == 0 {
            Err(last_error(path))
        } else {
            Ok(())
        }
    }
}

/// Enable the token privileges the mirror relies on: SeBackup (read
/// everything), SeRestore (write everything), SeSecurity (SACL access).
///
/// # Errors
///
/// Fails if the process token cannot be adjusted; individual privileges
/// that are not held are reported by name.
pub fn enable_backup_privileges() -> Result<()> {
    const PRIVILEGES: [&str; 3] = ["SeBackupPrivilege", "SeRestorePrivilege", "SeSecurityPrivilege"];

    let mut token: HANDLE = ptr::null_mut();
    let ok = unsafe {
        OpenProcessToken(
            GetCurrentProcess(),
            TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
            &mut token,
        )
    };
    if ok == 0 {
        return Err(last_error("process token"));
    }
    let token = Handle(token);

    for name in PRIVILEGES {
        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        let ok = unsafe { LookupPrivilegeValueW(ptr::null(), wide(name).as_ptr(), &mut luid) };
        if ok == 0 {
            return Err(last_error(name));
        }
        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: luid,
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };
        let ok = unsafe {
            AdjustTokenPrivileges(token.0, 0, &privileges, 0, ptr::null_mut(), ptr::null_mut())
        };
        // AdjustTokenPrivileges succeeds even when the privilege was not
        // assigned; the follow-up GetLastError tells the difference.
        if ok == 0 || unsafe { GetLastError() } != 0 {
            return Err(MirrorError::AccessDenied {
                path: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn reparse_buffer_round_trips_junctions() {
        let data = ReparseData::junction(r"\??\C:\target", r"C:\target");
        let buf = pack_reparse_buffer(&data).unwrap();
        assert_eq!(parse_reparse_buffer(&buf), data);
    }

    #[test]
    fn reparse_buffer_round_trips_relative_symlinks() {
        let data = ReparseData::symlink(r"..\sibling", r"..\sibling", true);
        let buf = pack_reparse_buffer(&data).unwrap();
        let parsed = parse_reparse_buffer(&buf);
        assert_eq!(parsed, data);
        assert!(parsed.is_relative());
    }

    #[test]
    fn filetime_conversion_round_trips() {
        let t = FileTime::from_unix_time(1_700_000_000, 123_456_700);
        assert_eq!(filetime_from_ticks(ticks_from_filetime(t)), t);
    }
}
