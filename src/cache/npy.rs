//! NPY 포맷 입출력
//!
//! source: https://numpy.org/doc/stable/reference/generated/numpy.lib.format.html
//!
//! 1차원 float 배열만 다룹니다. 쓰기는 `<f4`, 읽기는 `<f4` / `<f8` 지원.
//! 파이썬 쪽에서 `np.save`로 만든 캐시(기본 float64)도 그대로 읽힙니다.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

const MAGIC: &[u8] = b"\x93NUMPY";
/// 헤더 정렬 단위
const ALIGNMENT: usize = 64;

static DESCR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'descr':\s*'([^']+)'").expect("Invalid regex"));
static SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'shape':\s*\(([^)]*)\)").expect("Invalid regex"));
static FORTRAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'fortran_order':\s*(True|False)").expect("Invalid regex"));

/// 벡터를 NPY v1.0 바이트로 인코딩
pub fn encode(values: &[f32]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );

    // magic(6) + version(2) + header_len(2) + dict + padding + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (ALIGNMENT - unpadded % ALIGNMENT) % ALIGNMENT;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_len + values.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// NPY 바이트를 f32 벡터로 디코딩
///
/// 다차원 배열은 평탄화합니다 (C order만 지원).
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() < 10 || &bytes[..MAGIC.len()] != MAGIC {
        anyhow::bail!("Not an NPY file (bad magic)");
    }

    let major = bytes[6];
    let (header_len, header_start): (usize, usize) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                anyhow::bail!("Truncated NPY header");
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => anyhow::bail!("Unsupported NPY version: {}", v),
    };

    let data_start = header_start
        .checked_add(header_len)
        .context("NPY header length overflows")?;
    let header = bytes
        .get(header_start..data_start)
        .context("Truncated NPY header")?;
    let header = std::str::from_utf8(header).context("NPY header is not UTF-8")?;

    let descr = DESCR_RE
        .captures(header)
        .map(|c| c[1].to_string())
        .context("NPY header missing descr")?;

    if FORTRAN_RE
        .captures(header)
        .map(|c| &c[1] == "True")
        .unwrap_or(false)
    {
        anyhow::bail!("Fortran-ordered NPY arrays are not supported");
    }

    let count = SHAPE_RE
        .captures(header)
        .map(|c| parse_shape(&c[1]))
        .context("NPY header missing shape")??;

    let data = &bytes[data_start..];
    match descr.as_str() {
        "<f4" => {
            let needed = byte_len(count, 4)?;
            if data.len() < needed {
                anyhow::bail!("NPY data truncated: expected {} bytes, got {}", needed, data.len());
            }
            Ok(data[..needed]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect())
        }
        "<f8" => {
            let needed = byte_len(count, 8)?;
            if data.len() < needed {
                anyhow::bail!("NPY data truncated: expected {} bytes, got {}", needed, data.len());
            }
            Ok(data[..needed]
                .chunks_exact(8)
                .map(|b| {
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(b);
                    f64::from_le_bytes(arr) as f32
                })
                .collect())
        }
        other => anyhow::bail!("Unsupported NPY dtype: {}", other),
    }
}

/// "(384,)" / "(1, 384)" / "()" 형태의 shape 원소 수
fn parse_shape(inner: &str) -> Result<usize> {
    let mut count = 1usize;
    for dim in inner.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let n: usize = dim
            .parse()
            .with_context(|| format!("Invalid NPY shape dimension: {}", dim))?;
        count = count
            .checked_mul(n)
            .with_context(|| format!("NPY shape overflows: ({})", inner))?;
    }
    Ok(count)
}

fn byte_len(count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .with_context(|| format!("NPY data size overflows: {} x {} bytes", count, width))
}
