//! 벡터 유틸리티 - 메모리 벡터 인덱스와 유사도 계산
//!
//! 임베딩은 캐시(`data/embeddings/*.npy`)에 저장되고, 실행마다 메모리로 올려
//! 전수 비교합니다. 코퍼스가 작은 단일 프로세스 배치 도구이므로 ANN은 쓰지 않습니다.

// ============================================================================
// Types
// ============================================================================

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 인덱스에 추가된 순번
    pub index: usize,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// 메모리 벡터 인덱스
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 벡터 추가, 순번 반환
    pub fn push(&mut self, vector: Vec<f32>) -> usize {
        self.vectors.push(vector);
        self.vectors.len() - 1
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        self.vectors.get(index).map(Vec::as_slice)
    }

    /// 모든 벡터와의 유사도 (추가 순서)
    pub fn similarities(&self, query: &[f32]) -> Vec<f32> {
        self.vectors
            .iter()
            .map(|v| cosine_similarity(query, v))
            .collect()
    }

    /// 유사도 상위 k개
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .similarities(query)
            .into_iter()
            .enumerate()
            .map(|(index, similarity)| SearchResult { index, similarity })
            .collect();
        results.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then(a.index.cmp(&b.index))
        });
        results.truncate(limit);
        results
    }

    /// 가장 가까운 벡터의 유사도 (비어 있으면 None)
    pub fn max_similarity(&self, query: &[f32]) -> Option<f32> {
        self.similarities(query).into_iter().reduce(f32::max)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 평균 벡터 (차원이 다른 벡터는 무시)
///
/// 입력이 없으면 None.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let dimension = vectors.first()?.len();
    let mut sum = vec![0.0f32; dimension];
    let mut count = 0usize;
    for vector in vectors.iter().filter(|v| v.len() == dimension) {
        sum.iter_mut().zip(vector).for_each(|(s, v)| *s += v);
        count += 1;
    }
    sum.iter_mut().for_each(|s| *s /= count as f32);
    Some(sum)
}

// ============================================================================
// Tests
// ============================================================================
