//! Deterministic in-process embedder for tests.

use async_trait::async_trait;

use sitechat_openai::Embedder;
use sitechat_shared::Result;

const DIMENSIONS: usize = 32;

/// Embeds text as a normalized bag-of-words histogram over hash buckets.
///
/// Texts sharing vocabulary land near each other in cosine space, which
/// is enough signal for retrieval tests without any network calls.
#[derive(Default)]
pub struct FakeEmbedder;

impl FakeEmbedder {
    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            vector[bucket(&word.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

// FNV-1a, stable across runs and platforms.
fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    (hash % DIMENSIONS as u64) as usize
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| Self::embed_one(text)).collect())
    }
}
