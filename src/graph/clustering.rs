//! 토픽 클러스터링
//!
//! 개념을 토픽으로 묶는 전략 트레이트입니다.
//! 현재 구현은 의미를 보지 않는 고정 크기 배치입니다.

/// 클러스터링 입력 (삽입 순서대로 전달)
#[derive(Debug, Clone)]
pub struct ConceptRef<'a> {
    pub label: &'a str,
    pub mention_count: usize,
}

/// 개념 → 토픽 그룹화 전략
///
/// 반환값은 입력 인덱스의 그룹 목록이며, 모든 인덱스는 정확히 한 그룹에 속해야 합니다.
pub trait TopicClustering: Send + Sync {
    fn cluster(&self, concepts: &[ConceptRef<'_>]) -> Vec<Vec<usize>>;

    fn name(&self) -> &'static str;
}

/// 삽입 순서대로 `batch_size`개씩 자르는 클러스터링
#[derive(Debug, Clone)]
pub struct NaiveBatchClustering {
    batch_size: usize,
}

impl NaiveBatchClustering {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl Default for NaiveBatchClustering {
    fn default() -> Self {
        Self::new(10)
    }
}

impl TopicClustering for NaiveBatchClustering {
    fn cluster(&self, concepts: &[ConceptRef<'_>]) -> Vec<Vec<usize>> {
        (0..concepts.len())
            .collect::<Vec<_>>()
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    fn name(&self) -> &'static str {
        "naive-batch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Concept {}", i)).collect()
    }

    #[test]
    fn test_batches_of_ten() {
        let labels = refs(23);
        let concepts: Vec<_> = labels
            .iter()
            .map(|l| ConceptRef {
                label: l,
                mention_count: 1,
            })
            .collect();

        let groups = NaiveBatchClustering::default().cluster(&concepts);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (0..10).collect::<Vec<_>>());
        assert_eq!(groups[2], vec![20, 21, 22]);

        // 모든 개념이 정확히 한 번씩
        let mut all: Vec<usize> = groups.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        assert!(NaiveBatchClustering::new(10).cluster(&[]).is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let labels = refs(2);
        let concepts: Vec<_> = labels
            .iter()
            .map(|l| ConceptRef {
                label: l,
                mention_count: 0,
            })
            .collect();
        assert_eq!(NaiveBatchClustering::new(0).cluster(&concepts).len(), 2);
    }
}
