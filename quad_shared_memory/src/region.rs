//! Typed shared region holding exactly one `T`.

use crate::error::{ShmError, ShmResult};
use crate::platform::{
    ObjectId, create_shm, map_shared, open_shm, region_size, shm_identity, unlink_shm_if,
};
use memmap2::MmapMut;
use quad::shm::plain::PlainData;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::{debug, info, warn};

/// A name-addressed memory region mapped into this process, holding one `T`.
///
/// The creating process is the owner: only the owner unlinks the name, on
/// [`SharedRegion::destroy`] or when dropped, and only while the name still
/// refers to the object it created. An attached peer only unmaps.
///
/// The region does no synchronisation of its own. Callers decide who may
/// touch the contents, normally through `crate::sync`.
pub struct SharedRegion<T: PlainData> {
    name: String,
    mmap: MmapMut,
    base: NonNull<T>,
    // Identity of the created object; `None` for an attached peer.
    created: Option<ObjectId>,
    _marker: PhantomData<T>,
}

// SAFETY: the mapping is process-wide memory; access is serialised by the
// caller (the turn protocol) and `T` is plain data.
unsafe impl<T: PlainData> Send for SharedRegion<T> {}

impl<T: PlainData> SharedRegion<T> {
    /// Create the region, force-reclaiming a stale object of the same name.
    pub fn create(name: &str) -> ShmResult<Self> {
        Self::create_with(name, true)
    }

    /// Create the region, failing with [`ShmError::AlreadyExists`] if the
    /// name is taken.
    pub fn create_exclusive(name: &str) -> ShmResult<Self> {
        Self::create_with(name, false)
    }

    fn create_with(name: &str, overwrite: bool) -> ShmResult<Self> {
        let size = region_size::<T>();
        let file = create_shm(name, size, overwrite)?;
        let id = ObjectId::of(&file)?;
        let mut region = Self::from_mmap(name, map_shared(&file, size)?, Some(id))?;
        region.mmap.fill(0);
        info!(name, size, "Shared region created");
        Ok(region)
    }

    /// Attach to a region created by the other peer.
    ///
    /// Fails with [`ShmError::NotFound`] if the name does not exist and
    /// [`ShmError::SizeMismatch`] if it was sized for a different `T`.
    pub fn attach(name: &str) -> ShmResult<Self> {
        let size = region_size::<T>();
        let file = open_shm(name, size)?;
        let region = Self::from_mmap(name, map_shared(&file, size)?, None)?;
        info!(name, size, "Shared region attached");
        Ok(region)
    }

    fn from_mmap(name: &str, mut mmap: MmapMut, created: Option<ObjectId>) -> ShmResult<Self> {
        let ptr = mmap.as_mut_ptr();
        if (ptr as usize) % core::mem::align_of::<T>() != 0 || mmap.len() < core::mem::size_of::<T>() {
            return Err(ShmError::SizeMismatch {
                name: name.to_string(),
                expected: region_size::<T>(),
                actual: mmap.len(),
            });
        }
        let base = NonNull::new(ptr.cast::<T>()).ok_or_else(|| ShmError::NotFound {
            name: name.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            mmap,
            base,
            created,
            _marker: PhantomData,
        })
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Always `false`; a region holds at least one `T`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether this process created the region.
    pub fn is_owner(&self) -> bool {
        self.created.is_some()
    }

    /// Shared view of the contents.
    pub fn get(&self) -> &T {
        // SAFETY: base is aligned, in bounds, and any bit pattern written by
        // a peer is a valid `T` (PlainData).
        unsafe { self.base.as_ref() }
    }

    /// Exclusive view of the contents.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: as in `get`; `&mut self` rules out other local borrows.
        unsafe { self.base.as_mut() }
    }

    /// Copy of the contents taken with a volatile read.
    ///
    /// Used to inspect a region the local peer does not currently own, for
    /// example after the other peer stalled.
    pub fn snapshot(&self) -> T {
        // SAFETY: base is valid for reads of one `T`.
        unsafe { std::ptr::read_volatile(self.base.as_ptr()) }
    }

    /// Raw pointer to the contents. Valid while `self` is alive.
    pub fn as_ptr(&self) -> *mut T {
        self.base.as_ptr()
    }

    /// Whether a newer creator has taken over this owner's name.
    pub fn is_reclaimed(&self) -> ShmResult<bool> {
        let Some(id) = self.created else {
            return Ok(false);
        };
        Ok(shm_identity(&self.name)?.is_some_and(|current| current != id))
    }

    /// Unmap and, for the owner, unlink the name.
    ///
    /// Returns whether the name was unlinked. It is not when this process
    /// only attached, or when a newer [`SharedRegion::create`] reclaimed the
    /// name in the meantime; the newer region is left intact.
    pub fn destroy(mut self) -> ShmResult<bool> {
        self.unlink_if_owner()
    }

    fn unlink_if_owner(&mut self) -> ShmResult<bool> {
        let Some(id) = self.created.take() else {
            return Ok(false);
        };
        let unlinked = unlink_shm_if(&self.name, id)?;
        if unlinked {
            debug!(name = %self.name, "Shared region unlinked");
        }
        Ok(unlinked)
    }
}

impl<T: PlainData> Drop for SharedRegion<T> {
    fn drop(&mut self) {
        if let Err(e) = self.unlink_if_owner() {
            warn!(name = %self.name, "Failed to unlink shared region: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("/quad-region-{tag}-{}", std::process::id())
    }

    #[test]
    fn create_is_zeroed_and_attach_sees_writes() -> ShmResult<()> {
        let name = unique("rw");
        let mut owner = SharedRegion::<[u64; 16]>::create(&name)?;
        assert!(owner.is_owner());
        assert_eq!(owner.get(), &[0u64; 16]);
        owner.get_mut()[3] = 42;

        let peer = SharedRegion::<[u64; 16]>::attach(&name)?;
        assert!(!peer.is_owner());
        assert_eq!(peer.get()[3], 42);
        assert_eq!(peer.snapshot()[3], 42);
        assert_eq!(peer.len(), owner.len());

        assert!(owner.destroy()?);
        // The attached mapping survives the unlink.
        assert_eq!(peer.get()[3], 42);
        Ok(())
    }

    #[test]
    fn attach_missing_region_fails() {
        let result = SharedRegion::<u64>::attach(&unique("missing"));
        assert!(matches!(result, Err(ShmError::NotFound { .. })));
    }

    #[test]
    fn attach_with_other_layout_fails() -> ShmResult<()> {
        let name = unique("size");
        let _owner = SharedRegion::<[u8; 100_000]>::create(&name)?;
        let result = SharedRegion::<u64>::attach(&name);
        assert!(matches!(result, Err(ShmError::SizeMismatch { .. })));
        Ok(())
    }

    #[test]
    fn exclusive_create_refuses_live_region() -> ShmResult<()> {
        let name = unique("excl");
        let mut first = SharedRegion::<u64>::create(&name)?;
        *first.get_mut() = 7;

        let result = SharedRegion::<u64>::create_exclusive(&name);
        assert!(matches!(result, Err(ShmError::AlreadyExists { .. })));

        let second = SharedRegion::<u64>::create(&name)?;
        assert_eq!(*second.get(), 0);
        // `first` still maps the reclaimed object.
        assert_eq!(*first.get(), 7);
        Ok(())
    }

    #[test]
    fn reclaimed_owner_leaves_newer_region_alone() -> ShmResult<()> {
        let name = unique("reclaim");
        let first = SharedRegion::<u64>::create(&name)?;
        let mut second = SharedRegion::<u64>::create(&name)?;
        *second.get_mut() = 9;

        assert!(first.is_reclaimed()?);
        assert!(!second.is_reclaimed()?);
        assert!(!first.destroy()?);
        let peer = SharedRegion::<u64>::attach(&name)?;
        assert_eq!(*peer.get(), 9);

        assert!(second.destroy()?);
        assert!(matches!(
            SharedRegion::<u64>::attach(&name),
            Err(ShmError::NotFound { .. })
        ));
        Ok(())
    }
}
