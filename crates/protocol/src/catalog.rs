//! Static CEA/VESA/handheld resolution tables (WFD §5.1.1, display modes).
//!
//! Each catalog is a fixed, ordered sequence of [`Resolution`] values whose
//! `id` is unique within that catalog. The bitmasks sent in
//! `wfd_video_formats` (see [`crate::params`]) index into these tables by
//! `id`; the tables themselves are otherwise inert data.

/// A single advertised display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: u8,
    pub width: u32,
    pub height: u32,
    pub refresh: u32,
    pub progressive: bool,
    pub h264_level: &'static str,
    pub h265_level: &'static str,
}

impl Resolution {
    const fn new(
        id: u8,
        width: u32,
        height: u32,
        refresh: u32,
        progressive: bool,
        h264_level: &'static str,
        h265_level: &'static str,
    ) -> Self {
        Self {
            id,
            width,
            height,
            refresh,
            progressive,
            h264_level,
            h265_level,
        }
    }

    /// Total-order key: resolution × refresh, doubled for progressive scan.
    /// Ties are broken by `id` ascending (callers sort `(score, id)`).
    pub fn score(&self) -> u64 {
        let mult: u64 = if self.progressive { 2 } else { 1 };
        self.width as u64 * self.height as u64 * self.refresh as u64 * mult
    }
}

impl PartialOrd for Resolution {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Resolution {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score().cmp(&other.score()).then(self.id.cmp(&other.id))
    }
}

/// CEA-861 television modes, ids 0–26.
pub const CEA: &[Resolution] = &[
    Resolution::new(0, 640, 480, 60, true, "3.1", "3.1"),
    Resolution::new(1, 720, 480, 60, true, "3.1", "3.1"),
    Resolution::new(2, 720, 480, 60, false, "3.1", "3.1"),
    Resolution::new(3, 720, 480, 50, true, "3.1", "3.1"),
    Resolution::new(4, 720, 576, 50, false, "3.1", "3.1"),
    Resolution::new(5, 1280, 720, 30, true, "3.1", "3.1"),
    Resolution::new(6, 1280, 720, 60, true, "3.2", "4"),
    Resolution::new(7, 1280, 1080, 30, true, "4", "4"),
    Resolution::new(8, 1920, 1080, 60, true, "4.2", "4.1"),
    Resolution::new(9, 1920, 1080, 60, false, "4", "4"),
    Resolution::new(10, 1280, 720, 25, true, "3.1", "3.1"),
    Resolution::new(11, 1280, 720, 50, true, "3.2", "4"),
    Resolution::new(12, 1920, 1080, 25, true, "3.2", "4"),
    Resolution::new(13, 1920, 1080, 50, true, "4.2", "4.1"),
    Resolution::new(14, 1920, 1080, 50, false, "3.2", "4"),
    Resolution::new(15, 1280, 720, 24, true, "3.1", "3.1"),
    Resolution::new(16, 1920, 1080, 24, true, "3.2", "4"),
    Resolution::new(17, 3840, 2160, 30, true, "5.1", "5"),
    Resolution::new(18, 3840, 2160, 60, true, "5.1", "5"),
    Resolution::new(19, 4096, 2160, 30, true, "5.1", "5"),
    Resolution::new(20, 4096, 2160, 60, true, "5.2", "5.1"),
    Resolution::new(21, 3840, 2160, 25, true, "5.2", "5.1"),
    Resolution::new(22, 3840, 2160, 50, true, "5.2", "5"),
    Resolution::new(23, 4096, 2160, 25, true, "5.2", "5"),
    Resolution::new(24, 4086, 2160, 50, true, "5.2", "5"),
    Resolution::new(25, 4096, 2160, 24, true, "5.2", "5.1"),
    Resolution::new(26, 4096, 2160, 24, true, "5.2", "5.1"),
];

/// VESA computer monitor modes, ids 0–28.
pub const VESA: &[Resolution] = &[
    Resolution::new(0, 800, 600, 30, true, "3.1", "3.1"),
    Resolution::new(1, 800, 600, 60, true, "3.2", "4"),
    Resolution::new(2, 1024, 768, 30, true, "3.1", "3.1"),
    Resolution::new(3, 1024, 768, 60, true, "3.2", "4"),
    Resolution::new(4, 1152, 854, 30, true, "3.2", "4"),
    Resolution::new(5, 1152, 854, 60, true, "4", "4.1"),
    Resolution::new(6, 1280, 768, 30, true, "3.2", "4"),
    Resolution::new(7, 1280, 768, 60, true, "4", "4.1"),
    Resolution::new(8, 1280, 800, 30, true, "3.2", "4"),
    Resolution::new(9, 1280, 800, 60, true, "4", "4.1"),
    Resolution::new(10, 1360, 768, 30, true, "3.2", "4"),
    Resolution::new(11, 1360, 768, 60, true, "4", "4.1"),
    Resolution::new(12, 1366, 768, 30, true, "3.2", "4"),
    Resolution::new(13, 1366, 768, 60, true, "4.2", "4.1"),
    Resolution::new(14, 1280, 1024, 30, true, "3.2", "4"),
    Resolution::new(15, 1280, 1024, 60, true, "4.2", "4.1"),
    Resolution::new(16, 1440, 1050, 30, true, "3.2", "4"),
    Resolution::new(17, 1440, 1050, 60, true, "4.2", "4.1"),
    Resolution::new(18, 1440, 900, 30, true, "3.2", "4"),
    Resolution::new(19, 1440, 900, 60, true, "4.2", "4.1"),
    Resolution::new(20, 1600, 900, 30, true, "3.2", "4"),
    Resolution::new(21, 1600, 900, 60, true, "4.2", "4.1"),
    Resolution::new(22, 1600, 1200, 30, true, "4", "5"),
    Resolution::new(23, 1600, 1200, 60, true, "4.2", "5.1"),
    Resolution::new(24, 1680, 1024, 30, true, "3.2", "4"),
    Resolution::new(25, 1680, 1024, 60, true, "4.2", "4.1"),
    Resolution::new(26, 1680, 1050, 30, true, "3.2", "4"),
    Resolution::new(27, 1680, 1050, 60, true, "4.2", "4.1"),
    Resolution::new(28, 1920, 1200, 30, true, "4.2", "5"),
];

/// Handheld-device modes, ids 0–11.
pub const HANDHELD: &[Resolution] = &[
    Resolution::new(0, 800, 400, 30, true, "3.1", "3.1"),
    Resolution::new(1, 800, 480, 60, true, "3.1", "3.1"),
    Resolution::new(2, 854, 480, 30, true, "3.1", "3.1"),
    Resolution::new(3, 854, 480, 60, true, "3.1", "3.1"),
    Resolution::new(4, 864, 480, 30, true, "3.1", "3.1"),
    Resolution::new(5, 864, 480, 60, true, "3.1", "3.1"),
    Resolution::new(6, 640, 360, 30, true, "3.1", "3.1"),
    Resolution::new(7, 640, 360, 60, true, "3.1", "3.1"),
    Resolution::new(8, 960, 540, 30, true, "3.1", "3.1"),
    Resolution::new(9, 960, 540, 60, true, "3.1", "3.1"),
    Resolution::new(10, 848, 480, 30, true, "3.1", "3.1"),
    Resolution::new(11, 848, 480, 60, true, "3.1", "3.1"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unique_ids(catalog: &[Resolution]) {
        let mut ids: Vec<u8> = catalog.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len(), "duplicate id in catalog");
    }

    #[test]
    fn ids_unique_within_each_catalog() {
        assert_unique_ids(CEA);
        assert_unique_ids(VESA);
        assert_unique_ids(HANDHELD);
    }

    #[test]
    fn catalog_sizes_are_27_29_and_12() {
        assert_eq!(CEA.len(), 27);
        assert_eq!(VESA.len(), 29);
        assert_eq!(HANDHELD.len(), 12);
    }

    #[test]
    fn score_total_order_is_consistent_with_raw_fields() {
        // 1080p60 progressive must outrank 1080p60 interlaced (id 8 vs 9 in CEA).
        let p = CEA[8];
        let i = CEA[9];
        assert_eq!(p.width, i.width);
        assert_eq!(p.height, i.height);
        assert_eq!(p.refresh, i.refresh);
        assert!(p.progressive && !i.progressive);
        assert!(p.score() > i.score());
        assert!(p > i);
    }

    #[test]
    fn score_orders_every_pair_consistently_with_raw_score() {
        for catalog in [CEA, VESA, HANDHELD] {
            for a in catalog {
                for b in catalog {
                    assert_eq!(a < b, a.score() < b.score() || (a.score() == b.score() && a.id < b.id));
                }
            }
        }
    }

    #[test]
    fn native_format_entry_is_1080p60_progressive() {
        // wfd_video_formats native=0x08 refers to CEA id 8.
        let native = CEA.iter().find(|r| r.id == 8).unwrap();
        assert_eq!((native.width, native.height, native.refresh, native.progressive), (1920, 1080, 60, true));
    }
}
