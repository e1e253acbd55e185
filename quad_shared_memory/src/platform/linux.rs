//! Linux-specific shared memory operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use quad::config::validate_posix_name;
use quad::consts::REGION_ALIGNMENT;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use tracing::{debug, warn};

/// Mapped size for one `T`: its size rounded up to the next
/// [`REGION_ALIGNMENT`] boundary.
///
/// A size that is already a multiple still gains a full extra block. Both
/// peers compute the size this way and attach compares it exactly, so the
/// formula must never change independently on one side.
pub const fn region_size<T>() -> usize {
    region_size_for(core::mem::size_of::<T>())
}

/// Byte-count form of [`region_size`].
pub const fn region_size_for(size: usize) -> usize {
    (size / REGION_ALIGNMENT + 1) * REGION_ALIGNMENT
}

/// Reject names that POSIX `shm_open`/`sem_open` would not treat portably.
pub fn validate_name(name: &str) -> ShmResult<()> {
    validate_posix_name(name).map_err(|reason| ShmError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

/// Create a shared memory object of `size` bytes.
///
/// With `overwrite`, a stale object of the same name is unlinked and the
/// creation retried once; otherwise an existing object is reported as
/// [`ShmError::AlreadyExists`]. The new object is zero-filled by the kernel
/// when it is sized.
pub fn create_shm(name: &str, size: usize, overwrite: bool) -> ShmResult<File> {
    validate_name(name)?;
    let flags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR;
    let mode = Mode::from_bits_truncate(0o666);

    let fd = match shm_open(name, flags, mode) {
        Ok(fd) => fd,
        Err(Errno::EEXIST) if overwrite => {
            warn!(name, "Shared memory object already exists, reclaiming it");
            match shm_unlink(name) {
                Ok(()) | Err(Errno::ENOENT) => {}
                Err(e) => return Err(e.into()),
            }
            shm_open(name, flags, mode)?
        }
        Err(Errno::EEXIST) => {
            return Err(ShmError::AlreadyExists {
                name: name.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let file = File::from(fd);
    file.set_len(size as u64)?;
    debug!(name, size, "Created shared memory object");
    Ok(file)
}

/// Open an existing shared memory object and check its size.
pub fn open_shm(name: &str, expected_size: usize) -> ShmResult<File> {
    validate_name(name)?;
    let fd = match shm_open(name, OFlag::O_RDWR, Mode::empty()) {
        Ok(fd) => fd,
        Err(Errno::ENOENT) => {
            return Err(ShmError::NotFound {
                name: name.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let file = File::from(fd);
    let actual = file.metadata()?.len() as usize;
    if actual != expected_size {
        return Err(ShmError::SizeMismatch {
            name: name.to_string(),
            expected: expected_size,
            actual,
        });
    }
    Ok(file)
}

/// Remove a shared memory object name. Returns `false` if it did not exist.
///
/// Existing mappings in any process stay valid until they are unmapped.
pub fn unlink_shm(name: &str) -> ShmResult<bool> {
    match shm_unlink(name) {
        Ok(()) => Ok(true),
        Err(Errno::ENOENT) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Identity of one shared memory object, independent of its name.
///
/// A name reclaimed by another creator resolves to a different identity,
/// even though the old object lives on in existing mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId {
    dev: u64,
    ino: u64,
}

impl ObjectId {
    /// Identity of an open object.
    pub fn of(file: &File) -> ShmResult<Self> {
        let meta = file.metadata()?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

/// Identity of the object currently bound to `name`, or `None` if the name
/// does not exist.
pub fn shm_identity(name: &str) -> ShmResult<Option<ObjectId>> {
    match shm_open(name, OFlag::O_RDONLY, Mode::empty()) {
        Ok(fd) => Ok(Some(ObjectId::of(&File::from(fd))?)),
        Err(Errno::ENOENT) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Unlink `name` only while it still refers to `id`.
///
/// Returns `false` if the name is gone or was taken over by a newer object,
/// which is then left alone.
pub fn unlink_shm_if(name: &str, id: ObjectId) -> ShmResult<bool> {
    match shm_identity(name)? {
        Some(current) if current == id => unlink_shm(name),
        Some(_) => {
            warn!(name, "Shared memory name now belongs to a newer object, not unlinking");
            Ok(false)
        }
        None => Ok(false),
    }
}

/// Map `len` bytes of `file` read/write and shared.
pub fn map_shared(file: &File, len: usize) -> ShmResult<MmapMut> {
    // SAFETY: the object is a POSIX shm file sized to at least `len`; other
    // processes may write it concurrently, which callers serialise through
    // the turn protocol.
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn region_size_always_adds_a_block() {
        assert_eq!(region_size_for(0), REGION_ALIGNMENT);
        assert_eq!(region_size_for(1), REGION_ALIGNMENT);
        assert_eq!(region_size_for(REGION_ALIGNMENT), 2 * REGION_ALIGNMENT);
        assert_eq!(region_size::<[u8; 70_000]>(), 2 * REGION_ALIGNMENT);
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(matches!(
            validate_name("no-slash"),
            Err(ShmError::InvalidName { .. })
        ));
        assert!(validate_name("/ok").is_ok());
    }

    #[test]
    fn conditional_unlink_spares_reclaimed_name() -> ShmResult<()> {
        let name = format!("/quad-platform-id-{}", std::process::id());
        // Both handles stay open so neither inode can be recycled.
        let old_file = create_shm(&name, REGION_ALIGNMENT, true)?;
        let new_file = create_shm(&name, REGION_ALIGNMENT, true)?;
        let (old, new) = (ObjectId::of(&old_file)?, ObjectId::of(&new_file)?);
        assert_ne!(old, new);
        assert_eq!(shm_identity(&name)?, Some(new));

        assert!(!unlink_shm_if(&name, old)?);
        assert_eq!(shm_identity(&name)?, Some(new));
        assert!(unlink_shm_if(&name, new)?);
        assert_eq!(shm_identity(&name)?, None);
        Ok(())
    }

    proptest! {
        #[test]
        fn region_size_fits_and_is_aligned(size in 0usize..(1 << 24)) {
            let mapped = region_size_for(size);
            prop_assert_eq!(mapped % REGION_ALIGNMENT, 0);
            prop_assert!(mapped > size);
            prop_assert!(mapped - size <= REGION_ALIGNMENT);
        }
    }
}
