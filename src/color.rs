//! Category color allocation.
//!
//! Every category in a dataset carries a distinct display color. The
//! allocator works through three stages: a fixed high-contrast palette,
//! random HSV sampling biased toward saturated bright colors, and a
//! time-derived fallback that increments until unique. A stable FNV-1a
//! hash of the category name picks the preferred palette slot so the same
//! name tends to get the same color across datasets.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::StdRng, Rng, RngExt, SeedableRng};

/// Predefined high-contrast colors tried before any random sampling.
pub const PALETTE: [&str; 36] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD",
    "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E9", "#F8B500", "#FF69B4",
    "#32CD32", "#FF4500", "#8A2BE2", "#00CED1", "#FFD700", "#DC143C",
    "#00FF7F", "#FF1493", "#1E90FF", "#FF8C00", "#9370DB", "#00FA9A",
    "#FF6347", "#40E0D0", "#DA70D6", "#00BFFF", "#FFA500", "#BA55D3",
    "#7FFF00", "#FF69B4", "#6495ED", "#FF7F50", "#9932CC", "#00FFFF",
];

const RANDOM_ATTEMPTS: usize = 100;

/// 64-bit FNV-1a over arbitrary bytes.
///
/// Used where a color (or any choice) must be derived from a name
/// deterministically and portably.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Converts an HSV triple to RGB channels.
///
/// `h` is a fraction of the full hue circle in [0, 1); `s` and `v` are in
/// [0, 1]. Channels are truncated to 0..=255.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let h = (h.fract() + 1.0).fract();
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match sector as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    ((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

/// Request-local color allocator.
///
/// The used-color set is seeded from the dataset's existing categories
/// once per request and updated as colors are handed out, so a single
/// batch never allocates the same color twice. Comparison is
/// case-insensitive: colors are tracked uppercased.
#[derive(Debug)]
pub struct ColorAllocator {
    used: BTreeSet<String>,
    rng: Option<StdRng>,
}

impl ColorAllocator {
    /// Creates an allocator over the colors already present in a dataset.
    pub fn new(existing: impl IntoIterator<Item = String>) -> Self {
        Self {
            used: existing
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            rng: None,
        }
    }

    /// Creates an allocator with a deterministic sampling stage.
    pub fn with_seed(existing: impl IntoIterator<Item = String>, seed: u64) -> Self {
        let mut allocator = Self::new(existing);
        allocator.rng = Some(StdRng::seed_from_u64(seed));
        allocator
    }

    /// Returns true if a color is already taken (case-insensitive).
    pub fn is_used(&self, color: &str) -> bool {
        self.used.contains(&color.to_ascii_uppercase())
    }

    /// Claims an externally supplied color if it is a well-formed
    /// `#RRGGBB` value and not yet in use. Returns false when the caller
    /// must allocate instead.
    pub fn try_claim(&mut self, color: &str) -> bool {
        if !is_hex_color(color) || self.is_used(color) {
            return false;
        }
        self.used.insert(color.to_ascii_uppercase());
        true
    }

    /// Allocates a color for the given category name and marks it used.
    pub fn allocate(&mut self, name: &str) -> String {
        // Preferred palette slot for this name; falls through to a linear
        // scan when taken.
        let hinted = PALETTE[(fnv1a(name.as_bytes()) % PALETTE.len() as u64) as usize];
        if !self.is_used(hinted) {
            return self.take(hinted);
        }

        for color in PALETTE {
            if !self.is_used(color) {
                return self.take(color);
            }
        }

        for _ in 0..RANDOM_ATTEMPTS {
            let candidate = match self.rng.as_mut() {
                Some(rng) => random_candidate(rng),
                None => random_candidate(&mut rand::rng()),
            };
            if !self.is_used(&candidate) {
                return self.take(&candidate);
            }
        }

        // Last resort: derive from the clock and increment until unique.
        let mut stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            % 1_000_000;
        loop {
            let candidate = format!("#{stamp:06X}");
            if !self.is_used(&candidate) {
                return self.take(&candidate);
            }
            stamp = (stamp + 1) % 1_000_000;
        }
    }

    fn take(&mut self, color: &str) -> String {
        self.used.insert(color.to_ascii_uppercase());
        color.to_string()
    }
}

fn random_candidate<R: Rng + ?Sized>(rng: &mut R) -> String {
    let hue = rng.random::<f64>();
    let saturation = 0.7 + rng.random::<f64>() * 0.3;
    let value = 0.8 + rng.random::<f64>() * 0.2;
    let (r, g, b) = hsv_to_rgb(hue, saturation, value);
    format!("#{r:02X}{g:02X}{b:02X}")
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].bytes().all(|b| b.is_ascii_hexdigit())
}
