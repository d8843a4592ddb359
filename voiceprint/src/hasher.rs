//! Random hyperplane LSH over embedding vectors.

use serde::{Deserialize, Serialize};

use crate::error::VoiceprintError;

/// Projects embeddings into short hex hashes.
///
/// The hasher holds `bits` unit-length hyperplanes of dimension `dim`. Each
/// hyperplane contributes one bit: 1 when the dot product with the input is
/// positive. Bits are packed MSB-first and rendered as uppercase hex of
/// length `bits / 4`, so nearby embeddings land on nearby bitstrings.
///
/// For cross-language stability, persist the planes with [`Hasher::planes`]
/// / [`Hasher::to_json`] and reload them with [`Hasher::from_json`]: any
/// implementation loading the same planes produces identical hashes.
#[derive(Debug)]
pub struct Hasher {
    dim: usize,
    bits: usize,
    seed: u64,
    planes: Vec<Vec<f32>>,
}

/// Persisted hyperplane matrix.
#[derive(Serialize, Deserialize)]
struct PlanesFile {
    dim: usize,
    bits: usize,
    #[serde(default)]
    seed: u64,
    planes: Vec<Vec<f32>>,
}

impl Hasher {
    /// Creates a hasher with hyperplanes drawn from a seeded PRNG
    /// (splitmix64-initialized xoshiro256** with a Box-Muller transform),
    /// then normalized to unit length. The same `(dim, bits, seed)` always
    /// yields the same planes.
    ///
    /// # Panics
    ///
    /// Panics when `dim` is zero or `bits` is not a positive multiple of 4.
    pub fn new(dim: usize, bits: usize, seed: u64) -> Self {
        assert!(dim > 0, "voiceprint: dim must be positive");
        assert!(
            bits > 0 && bits % 4 == 0,
            "voiceprint: bits must be a positive multiple of 4"
        );

        let mut rng = Xoshiro256ss::new(seed);
        let mut planes = Vec::with_capacity(bits);
        for _ in 0..bits {
            let mut plane: Vec<f32> = (0..dim).map(|_| rng.norm_f64() as f32).collect();
            let mut norm = 0.0f64;
            for &v in &plane {
                norm += (v as f64) * (v as f64);
            }
            norm = norm.sqrt();
            if norm > 0.0 {
                let scale = (1.0 / norm) as f32;
                for v in &mut plane {
                    *v *= scale;
                }
            }
            planes.push(plane);
        }
        Self {
            dim,
            bits,
            seed,
            planes,
        }
    }

    /// Creates a hasher from pre-computed planes.
    ///
    /// # Panics
    ///
    /// Panics on a zero `dim`, a `bits` that is not a positive multiple of
    /// 4, or a plane count/length mismatch.
    pub fn from_planes(dim: usize, bits: usize, planes: Vec<Vec<f32>>) -> Self {
        assert!(dim > 0, "voiceprint: dim must be positive");
        assert!(
            bits > 0 && bits % 4 == 0,
            "voiceprint: bits must be a positive multiple of 4"
        );
        assert_eq!(planes.len(), bits, "voiceprint: plane count must equal bits");
        for (i, p) in planes.iter().enumerate() {
            assert_eq!(p.len(), dim, "voiceprint: plane {i} has wrong dimension");
        }
        Self {
            dim,
            bits,
            seed: 0,
            planes,
        }
    }

    /// Loads a hasher from a persisted planes JSON document
    /// (`{dim, bits, seed, planes}`).
    pub fn from_json(data: &[u8]) -> Result<Self, VoiceprintError> {
        let pf: PlanesFile = serde_json::from_slice(data)
            .map_err(|e| VoiceprintError::InvalidPlanes(format!("parse: {e}")))?;
        if pf.dim == 0 {
            return Err(VoiceprintError::InvalidPlanes("dim is zero".into()));
        }
        if pf.bits == 0 || pf.bits % 4 != 0 {
            return Err(VoiceprintError::InvalidPlanes(format!(
                "bits {} is not a positive multiple of 4",
                pf.bits
            )));
        }
        if pf.planes.len() != pf.bits {
            return Err(VoiceprintError::InvalidPlanes(format!(
                "expected {} planes, got {}",
                pf.bits,
                pf.planes.len()
            )));
        }
        for (i, p) in pf.planes.iter().enumerate() {
            if p.len() != pf.dim {
                return Err(VoiceprintError::InvalidPlanes(format!(
                    "plane {i} has length {}, expected {}",
                    p.len(),
                    pf.dim
                )));
            }
        }
        Ok(Self {
            dim: pf.dim,
            bits: pf.bits,
            seed: pf.seed,
            planes: pf.planes,
        })
    }

    /// Serializes the planes for sharing with other implementations.
    pub fn to_json(&self) -> Vec<u8> {
        let pf = PlanesFile {
            dim: self.dim,
            bits: self.bits,
            seed: self.seed,
            planes: self.planes.clone(),
        };
        serde_json::to_vec(&pf).expect("planes serialize")
    }

    /// Hashes an embedding into an uppercase hex string of `bits / 4`
    /// characters. The embedding length must equal the hasher dimension.
    pub fn hash(&self, embedding: &[f32]) -> Result<String, VoiceprintError> {
        if embedding.len() != self.dim {
            return Err(VoiceprintError::DimensionMismatch {
                expected: self.dim,
                got: embedding.len(),
            });
        }

        let mut packed = vec![0u8; self.bits.div_ceil(8)];
        for (i, plane) in self.planes.iter().enumerate() {
            let mut dot = 0.0f32;
            for (p, e) in plane.iter().zip(embedding.iter()) {
                dot += p * e;
            }
            if dot > 0.0 {
                packed[i / 8] |= 1 << (7 - i % 8);
            }
        }

        let mut out = String::with_capacity(self.bits / 4);
        for (i, b) in packed.iter().enumerate() {
            let hi = b >> 4;
            let lo = b & 0x0f;
            out.push(char::from_digit(hi as u32, 16).unwrap().to_ascii_uppercase());
            if 2 * i + 1 < self.bits / 4 {
                out.push(char::from_digit(lo as u32, 16).unwrap().to_ascii_uppercase());
            }
        }
        out.truncate(self.bits / 4);
        Ok(out)
    }

    /// Hash bit count.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Expected embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The seed this hasher was generated from (zero for explicit planes).
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The hyperplane matrix (`bits` rows of `dim` values).
    pub fn planes(&self) -> &[Vec<f32>] {
        &self.planes
    }
}

// xoshiro256** seeded via splitmix64, with Box-Muller for normal deviates.
// Deterministic across platforms; plane generation depends only on the seed.
struct Xoshiro256ss {
    s: [u64; 4],
    spare: Option<f64>,
}

impl Xoshiro256ss {
    fn new(seed: u64) -> Self {
        let mut z = seed;
        let mut s = [0u64; 4];
        for slot in &mut s {
            z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut x = z;
            x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            *slot = x ^ (x >> 31);
        }
        Self { s, spare: None }
    }

    fn next_u64(&mut self) -> u64 {
        let result = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    fn uniform_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn norm_f64(&mut self) -> f64 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        loop {
            let u1 = self.uniform_f64();
            let u2 = self.uniform_f64();
            if u1 > 0.0 {
                let mag = (-2.0 * u1.ln()).sqrt();
                let angle = 2.0 * std::f64::consts::PI * u2;
                self.spare = Some(mag * angle.sin());
                return mag * angle.cos();
            }
        }
    }
}
