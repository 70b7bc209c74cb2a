use super::ty::{align_up, VariantType, MAX_DEPTH};
use super::Value;
use crate::error::{Error, Result};

/// append `value` to `out`
///
/// the top-level value starts at offset 0 and every container starts at a
/// multiple of its own alignment, so padding against the absolute buffer
/// position equals padding relative to the enclosing container.
pub(super) fn write(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Byte(b) => out.push(*b),
        Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_bits().to_le_bytes()),
        Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        Value::Variant(inner) => {
            write(inner, out);
            out.push(0);
            out.extend_from_slice(inner.value_type().signature().as_bytes());
        }
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Array(elem, items) => write_array(elem, items, out),
        Value::Tuple(members) => write_struct(members.iter(), out),
        Value::DictEntry(k, v) => write_struct([k.as_ref(), v.as_ref()].into_iter(), out),
    }
}

fn write_array(elem: &VariantType, items: &[Value], out: &mut Vec<u8>) {
    if elem.fixed_size().is_some() {
        for item in items {
            write(item, out);
        }
        return;
    }

    let start = out.len();
    let alignment = elem.alignment();
    let mut ends = Vec::with_capacity(items.len());
    for item in items {
        pad(out, alignment);
        write(item, out);
        ends.push(out.len() - start);
    }
    let width = frame_width(out.len() - start, ends.len());
    for end in ends {
        write_offset(out, end, width);
    }
}

fn write_struct<'a>(members: impl ExactSizeIterator<Item = &'a Value>, out: &mut Vec<u8>) {
    let start = out.len();
    let count = members.len();
    let mut frames = Vec::new();
    let mut alignment = 1;
    let mut fixed = true;

    for (i, member) in members.enumerate() {
        let ty = member.value_type();
        alignment = alignment.max(ty.alignment());
        pad(out, ty.alignment());
        write(member, out);
        if ty.fixed_size().is_none() {
            fixed = false;
            if i + 1 != count {
                frames.push(out.len() - start);
            }
        }
    }

    if fixed {
        if count == 0 {
            out.push(0);
        } else {
            pad(out, alignment);
        }
        return;
    }

    let width = frame_width(out.len() - start, frames.len());
    for end in frames.into_iter().rev() {
        write_offset(out, end, width);
    }
}

fn pad(out: &mut Vec<u8>, alignment: usize) {
    let target = align_up(out.len(), alignment);
    out.resize(target, 0);
}

/// smallest framing offset width that can address the whole container
fn frame_width(body: usize, n_offsets: usize) -> usize {
    if n_offsets == 0 {
        0
    } else if body + n_offsets <= u8::MAX as usize {
        1
    } else if body + 2 * n_offsets <= u16::MAX as usize {
        2
    } else if body as u64 + 4 * n_offsets as u64 <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

/// framing offset width used by a container of `len` bytes
fn offset_width(len: usize) -> usize {
    if len == 0 {
        0
    } else if len <= u8::MAX as usize {
        1
    } else if len <= u16::MAX as usize {
        2
    } else if len as u64 <= u32::MAX as u64 {
        4
    } else {
        8
    }
}

fn write_offset(out: &mut Vec<u8>, value: usize, width: usize) {
    let bytes = (value as u64).to_le_bytes();
    out.extend_from_slice(&bytes[..width]);
}

fn read_offset(data: &[u8], at: usize, width: usize) -> Result<usize> {
    let slice = data
        .get(at..at + width)
        .ok_or_else(|| Error::invalid_variant("framing offset out of bounds"))?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(slice);
    usize::try_from(u64::from_le_bytes(buf))
        .map_err(|_| Error::invalid_variant("framing offset overflows"))
}

fn fixed<const N: usize>(data: &[u8]) -> Result<[u8; N]> {
    data.try_into()
        .map_err(|_| Error::invalid_variant(format!("expected {} bytes, found {}", N, data.len())))
}

fn read_str(data: &[u8]) -> Result<String> {
    let (last, body) = data
        .split_last()
        .ok_or_else(|| Error::invalid_variant("empty string data"))?;
    if *last != 0 {
        return Err(Error::invalid_variant("string not nul terminated"));
    }
    if body.contains(&0) {
        return Err(Error::invalid_variant("string contains embedded nul"));
    }
    String::from_utf8(body.to_vec()).map_err(|_| Error::invalid_variant("string is not utf-8"))
}

/// decode `data` (exactly one value) as `ty`
pub(super) fn read(ty: &VariantType, data: &[u8], depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid_variant("nesting too deep"));
    }
    if let Some(size) = ty.fixed_size() {
        if data.len() != size {
            return Err(Error::invalid_variant(format!(
                "type {} needs {} bytes, found {}",
                ty,
                size,
                data.len()
            )));
        }
    }

    let value = match ty {
        VariantType::Bool => match data[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            b => return Err(Error::invalid_variant(format!("invalid boolean byte {}", b))),
        },
        VariantType::Byte => Value::Byte(data[0]),
        VariantType::Int16 => Value::Int16(i16::from_le_bytes(fixed(data)?)),
        VariantType::UInt16 => Value::UInt16(u16::from_le_bytes(fixed(data)?)),
        VariantType::Int32 => Value::Int32(i32::from_le_bytes(fixed(data)?)),
        VariantType::UInt32 => Value::UInt32(u32::from_le_bytes(fixed(data)?)),
        VariantType::Int64 => Value::Int64(i64::from_le_bytes(fixed(data)?)),
        VariantType::UInt64 => Value::UInt64(u64::from_le_bytes(fixed(data)?)),
        VariantType::Double => Value::Double(f64::from_bits(u64::from_le_bytes(fixed(data)?))),
        VariantType::String => Value::String(read_str(data)?),
        VariantType::ObjectPath => Value::ObjectPath(read_str(data)?),
        VariantType::Signature => Value::Signature(read_str(data)?),
        VariantType::Variant => {
            let sep = data
                .iter()
                .rposition(|&b| b == 0)
                .ok_or_else(|| Error::invalid_variant("variant without type separator"))?;
            let sig = std::str::from_utf8(&data[sep + 1..])
                .map_err(|_| Error::invalid_variant("variant type is not utf-8"))?;
            let child_ty = VariantType::parse(sig)?;
            Value::Variant(Box::new(read(&child_ty, &data[..sep], depth + 1)?))
        }
        VariantType::Array(elem) => read_array(elem, data, depth)?,
        VariantType::Tuple(members) => Value::Tuple(read_struct(members, data, depth)?),
        VariantType::DictEntry(k, v) => {
            let types = [k.as_ref().clone(), v.as_ref().clone()];
            let mut members = read_struct(&types, data, depth)?.into_iter();
            match (members.next(), members.next()) {
                (Some(key), Some(value)) => Value::DictEntry(Box::new(key), Box::new(value)),
                _ => return Err(Error::invalid_variant("dict entry missing members")),
            }
        }
    };
    Ok(value)
}

fn read_array(elem: &VariantType, data: &[u8], depth: usize) -> Result<Value> {
    if *elem == VariantType::Byte {
        return Ok(Value::Bytes(data.to_vec()));
    }

    if let Some(size) = elem.fixed_size() {
        if data.len() % size != 0 {
            return Err(Error::invalid_variant(format!(
                "array of {} has length {} not a multiple of {}",
                elem,
                data.len(),
                size
            )));
        }
        let items = data
            .chunks(size)
            .map(|chunk| read(elem, chunk, depth + 1))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Array(elem.clone(), items));
    }

    if data.is_empty() {
        return Ok(Value::Array(elem.clone(), Vec::new()));
    }

    let len = data.len();
    let width = offset_width(len);
    let table_start = read_offset(data, len - width, width)?;
    if table_start > len {
        return Err(Error::invalid_variant("array offset table out of bounds"));
    }
    let table_len = len - table_start;
    if table_len == 0 || table_len % width != 0 {
        return Err(Error::invalid_variant("array offset table has invalid size"));
    }

    let n = table_len / width;
    let alignment = elem.alignment();
    let mut items = Vec::with_capacity(n);
    let mut prev_end = 0;
    for i in 0..n {
        let end = read_offset(data, table_start + i * width, width)?;
        let start = align_up(prev_end, alignment);
        if start > end || end > table_start {
            return Err(Error::invalid_variant("array element out of bounds"));
        }
        items.push(read(elem, &data[start..end], depth + 1)?);
        prev_end = end;
    }
    Ok(Value::Array(elem.clone(), items))
}

fn read_struct(members: &[VariantType], data: &[u8], depth: usize) -> Result<Vec<Value>> {
    let len = data.len();
    let width = offset_width(len);
    let n_frames = members
        .iter()
        .enumerate()
        .filter(|(i, m)| m.fixed_size().is_none() && i + 1 != members.len())
        .count();
    let frames_len = n_frames * width;
    if frames_len > len {
        return Err(Error::invalid_variant("structure framing exceeds data"));
    }
    let body_end = len - frames_len;

    let mut values = Vec::with_capacity(members.len());
    let mut pos = 0;
    let mut frame = 0;
    for (i, ty) in members.iter().enumerate() {
        let start = align_up(pos, ty.alignment());
        let end = match ty.fixed_size() {
            Some(size) => start + size,
            None if i + 1 == members.len() => body_end,
            None => {
                frame += 1;
                read_offset(data, len - frame * width, width)?
            }
        };
        if start > end || end > body_end {
            return Err(Error::invalid_variant(format!(
                "structure member {} out of bounds",
                i
            )));
        }
        values.push(read(ty, &data[start..end], depth + 1)?);
        pos = end;
    }
    Ok(values)
}
