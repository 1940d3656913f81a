use image::GrayImage;
use std::collections::HashMap;
use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 128;

/// Identity of a rendered slice within one volume's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SliceKey {
    /// XY cross-section at a Z index.
    Xy(usize),
    /// XZ cross-section at a Y index.
    Xz(usize),
    /// Oblique plane raster, identified by its frame version.
    Plane(u64),
}

/// Fixed-capacity LRU cache of contrast-baked rasters.
///
/// Rasters are owned exclusively by the cache; evicted entries are dropped,
/// so callers copy anything they need past the next mutation. One instance
/// exists per open volume, and the whole cache is cleared when the contrast
/// range changes because the stored rasters bake it in.
pub struct SliceCache {
    capacity: usize,
    entries: HashMap<SliceKey, GrayImage>,
    /// Access order, least recently used at the front.
    order: VecDeque<SliceKey>,
}

impl SliceCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity.max(1)),
            order: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &SliceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a raster, promoting the key to most recently used.
    pub fn get(&mut self, key: &SliceKey) -> Option<&GrayImage> {
        if self.entries.contains_key(key) {
            self.promote(*key);
        }
        self.entries.get(key)
    }

    /// Insert or replace a raster at the most-recently-used end, evicting
    /// from the least-recently-used end while over capacity.
    pub fn put(&mut self, key: SliceKey, raster: GrayImage) {
        if self.entries.insert(key, raster).is_some() {
            self.promote(key);
        } else {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn promote(&mut self, key: SliceKey) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(tag: u8) -> GrayImage {
        GrayImage::from_raw(2, 2, vec![tag; 4]).unwrap()
    }

    #[test]
    fn capacity_is_a_hard_bound() {
        let mut cache = SliceCache::new(4);
        for z in 0..10 {
            cache.put(SliceKey::Xy(z), raster(z as u8));
        }
        assert_eq!(cache.len(), 4);
        // The six earliest-inserted keys are gone.
        for z in 0..6 {
            assert!(!cache.contains(&SliceKey::Xy(z)));
        }
        for z in 6..10 {
            assert!(cache.contains(&SliceKey::Xy(z)));
        }
    }

    #[test]
    fn get_promotes_against_eviction() {
        let mut cache = SliceCache::new(2);
        cache.put(SliceKey::Xy(0), raster(0));
        cache.put(SliceKey::Xy(1), raster(1));
        assert!(cache.get(&SliceKey::Xy(0)).is_some());
        cache.put(SliceKey::Xy(2), raster(2));
        assert!(cache.contains(&SliceKey::Xy(0)));
        assert!(!cache.contains(&SliceKey::Xy(1)));
        assert!(cache.contains(&SliceKey::Xy(2)));
    }

    #[test]
    fn put_replaces_and_promotes_existing_keys() {
        let mut cache = SliceCache::new(2);
        cache.put(SliceKey::Xy(0), raster(0));
        cache.put(SliceKey::Xy(1), raster(1));
        cache.put(SliceKey::Xy(0), raster(9));
        cache.put(SliceKey::Xy(2), raster(2));
        assert!(cache.contains(&SliceKey::Xy(0)));
        assert!(!cache.contains(&SliceKey::Xy(1)));
        assert_eq!(cache.get(&SliceKey::Xy(0)).unwrap().get_pixel(0, 0).0[0], 9);
    }

    #[test]
    fn distinct_key_kinds_do_not_collide() {
        let mut cache = SliceCache::new(4);
        cache.put(SliceKey::Xy(3), raster(1));
        cache.put(SliceKey::Xz(3), raster(2));
        cache.put(SliceKey::Plane(3), raster(3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = SliceCache::new(2);
        cache.put(SliceKey::Xy(0), raster(0));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&SliceKey::Xy(0)).is_none());
    }
}
