//! TF-IDF 키워드 인덱스
//!
//! 소문자 영숫자 토큰(2자 이상, 불용어 제외)에 대해
//! smooth idf `ln((1 + N) / (1 + df)) + 1`을 곱하고 L2 정규화한 벡터를 만듭니다.
//! 점수는 질의 벡터와 문서 벡터의 코사인 유사도입니다.

use std::collections::HashMap;

/// 키워드 검색에서 무시하는 영어 불용어
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by",
    "can", "do", "does", "for", "from", "has", "have", "how", "if", "in", "into", "is", "it", "its",
    "may", "more", "most", "no", "not", "of", "on", "or", "other", "our", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "would", "you",
    "your",
];

type SparseVector = HashMap<String, f32>;

/// 메모리 TF-IDF 인덱스
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    idf: HashMap<String, f32>,
    vectors: Vec<SparseVector>,
}

impl TfIdfIndex {
    /// 문서 텍스트 목록으로 인덱스 생성 (인덱스 = 입력 순서)
    pub fn build<S: AsRef<str>>(documents: &[S]) -> Self {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();
        let n = tokenized.len() as f32;

        let mut df: HashMap<&str, usize> = HashMap::new();
        for tokens in &tokenized {
            let mut unique: Vec<&str> = tokens.iter().map(String::as_str).collect();
            unique.sort_unstable();
            unique.dedup();
            for token in unique {
                *df.entry(token).or_default() += 1;
            }
        }

        let idf: HashMap<String, f32> = df
            .into_iter()
            .map(|(term, count)| {
                let value = ((1.0 + n) / (1.0 + count as f32)).ln() + 1.0;
                (term.to_string(), value)
            })
            .collect();

        let vectors = tokenized
            .iter()
            .map(|tokens| weigh(tokens, &idf))
            .collect();

        Self { idf, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 모든 문서에 대한 점수 (입력 순서)
    ///
    /// 인덱스에 없는 질의 단어는 무시합니다.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let query_vec = weigh(&tokenize(query), &self.idf);
        if query_vec.is_empty() {
            return vec![0.0; self.vectors.len()];
        }
        self.vectors
            .iter()
            .map(|doc| {
                query_vec
                    .iter()
                    .filter_map(|(term, q)| doc.get(term).map(|d| q * d))
                    .sum()
            })
            .collect()
    }

    /// 점수 > 0인 상위 k개 (인덱스, 점수), 점수 내림차순
    pub fn search(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

/// 소문자 영숫자 토큰 (2자 이상, 불용어 제외)
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// 단어 빈도 × idf, L2 정규화
fn weigh(tokens: &[String], idf: &HashMap<String, f32>) -> SparseVector {
    let mut tf: SparseVector = HashMap::new();
    for token in tokens {
        if let Some(weight) = idf.get(token) {
            *tf.entry(token.clone()).or_default() += weight;
        }
    }
    let norm = tf.values().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        tf.values_mut().for_each(|v| *v /= norm);
    }
    tf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("What is SPARQL? It's a query-language."),
            vec!["sparql", "query", "language"]
        );
    }

    #[test]
    fn test_ranks_matching_document_first() {
        let index = TfIdfIndex::build(&[
            "RDF and SPARQL basics. SPARQL queries RDF graphs.",
            "Knowledge graph fundamentals: nodes and edges.",
        ]);
        let results = index.search("what is SPARQL?", 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 > 0.0 && results[0].1 <= 1.0 + 1e-6);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let index = TfIdfIndex::build(&[
            "graph ontology",
            "graph reasoning",
            "graph storage",
        ]);
        let scores = index.scores("graph ontology");
        assert!(scores[0] > scores[1]);
        assert!((scores[1] - scores[2]).abs() < 1e-6);
    }

    #[test]
    fn test_empty_and_unknown_queries() {
        let index = TfIdfIndex::build(&["alpha beta"]);
        assert_eq!(index.scores("zzz"), vec![0.0]);
        assert!(index.search("", 3).is_empty());
        assert!(TfIdfIndex::build::<&str>(&[]).is_empty());
    }
}
