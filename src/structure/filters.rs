//! Stream decoding needed to read document structure
//!
//! Only what cross-reference streams and object streams require: FlateDecode
//! with optional PNG predictors. Page content is never decoded.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::StructureError;
use crate::types::{Dictionary, Object, Stream};

type Result<T> = std::result::Result<T, StructureError>;

/// Decode a structural stream, refusing output larger than `limit` bytes.
pub fn decode_stream(stream: &Stream, limit: usize) -> Result<Vec<u8>> {
    let filters = filter_names(&stream.dict)?;
    let params = decode_params(&stream.dict);

    match filters.as_slice() {
        [] => Ok(stream.content.clone()),
        [filter] if filter.as_slice() == b"FlateDecode" || filter.as_slice() == b"Fl" => {
            let inflated = inflate(&stream.content, limit)?;
            match params {
                Some(params) => apply_predictor(inflated, params),
                None => Ok(inflated),
            }
        }
        other => Err(StructureError::Decode(format!(
            "unsupported filter chain: {}",
            other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect::<Vec<_>>()
                .join(",")
        ))),
    }
}

fn filter_names(dict: &Dictionary) -> Result<Vec<Vec<u8>>> {
    match dict.get(b"Filter") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Name(name)) => Ok(vec![name.clone()]),
        Ok(Object::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_name()
                    .map(<[u8]>::to_vec)
                    .map_err(|_| StructureError::Decode("filter is not a name".into()))
            })
            .collect(),
        Ok(_) => Err(StructureError::Decode("malformed /Filter".into())),
    }
}

fn decode_params(dict: &Dictionary) -> Option<&Dictionary> {
    match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(params) => Some(params),
        Object::Array(items) => items.first().and_then(|item| item.as_dict().ok()),
        _ => None,
    }
}

fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| StructureError::Decode(format!("inflate failed: {}", e)))?;
    if out.len() > limit {
        return Err(StructureError::Decode(format!(
            "decoded stream exceeds {} bytes",
            limit
        )));
    }
    Ok(out)
}

fn apply_predictor(data: Vec<u8>, params: &Dictionary) -> Result<Vec<u8>> {
    let int_param = |key: &[u8], default: i64| params.get(key).and_then(Object::as_i64).unwrap_or(default);
    let predictor = int_param(b"Predictor", 1);
    match predictor {
        1 => Ok(data),
        10..=15 => {
            let colors = int_param(b"Colors", 1);
            let bits = int_param(b"BitsPerComponent", 8);
            let columns = int_param(b"Columns", 1);
            if !(1..=32).contains(&colors) || !matches!(bits, 1 | 2 | 4 | 8 | 16) || columns < 1 {
                return Err(StructureError::Decode("bad predictor parameters".into()));
            }
            let bytes_per_pixel = ((colors * bits + 7) / 8) as usize;
            let row_len = ((colors * bits * columns + 7) / 8) as usize;
            png_unfilter(&data, row_len, bytes_per_pixel)
        }
        other => Err(StructureError::Decode(format!("unsupported predictor {}", other))),
    }
}

fn png_unfilter(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>> {
    let stride = row_len + 1;
    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        if chunk.len() < stride {
            break;
        }
        let (kind, raw) = (chunk[0], &chunk[1..]);
        let mut row = raw.to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(StructureError::Decode(format!("bad PNG row filter {}", other)))
                }
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
