/*
 * Copyright (C) 2021 The Android Open Source Project
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use super::{pad_size, Parcel};
use crate::error::{Result, StatusCode};
use crate::proxy::SpIBinder;

use std::convert::TryFrom;

/// A type whose instances can be written to a [`Parcel`].
pub trait Serialize {
    /// Serialize this instance into the given [`Parcel`].
    fn serialize(&self, parcel: &mut Parcel) -> Result<()>;
}

/// A type whose instances can be restored from a [`Parcel`].
pub trait Deserialize: Sized {
    /// Deserialize an instance from the given [`Parcel`].
    fn deserialize(parcel: &Parcel) -> Result<Self>;
}

/// Helper trait for types that can be serialized as arrays.
///
/// Defaults to the untyped array layout: an element count followed by the
/// elements in order. Scalar types override this with a packed layout (a byte
/// length followed by the densely packed elements, padded to a 4-byte
/// boundary).
pub trait SerializeArray: Serialize + Sized {
    /// Serialize an array of this type into the given [`Parcel`].
    fn serialize_array(slice: &[Self], parcel: &mut Parcel) -> Result<()> {
        let len = i32::try_from(slice.len()).map_err(|_| StatusCode::BAD_VALUE)?;
        parcel.write_i32(len)?;
        for item in slice {
            item.serialize(parcel)?;
        }
        Ok(())
    }
}

/// Helper trait for types that can be deserialized as arrays.
pub trait DeserializeArray: Deserialize {
    /// Deserialize an array of this type from the given [`Parcel`]. `None`
    /// means the null array was read.
    fn deserialize_array(parcel: &Parcel) -> Result<Option<Vec<Self>>> {
        let len = parcel.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        // Every element consumes at least one 4-byte slot, so this bounds the
        // allocation for hostile counts.
        let mut vec = Vec::with_capacity(len.min(parcel.data_avail() / 4));
        for _ in 0..len {
            vec.push(Deserialize::deserialize(parcel)?);
        }
        Ok(Some(vec))
    }
}

/// Helper trait for types that can be nullable when serialized.
pub trait SerializeOption: Serialize {
    /// Serialize an Option of this type into the given [`Parcel`].
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        match this {
            None => parcel.write_i32(-1),
            Some(inner) => inner.serialize(parcel),
        }
    }
}

/// Helper trait for types that can be nullable when deserialized.
pub trait DeserializeOption: Deserialize {
    /// Deserialize an Option of this type from the given [`Parcel`].
    fn deserialize_option(parcel: &Parcel) -> Result<Option<Self>>;
}

impl<T: Serialize + ?Sized> Serialize for &T {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        Serialize::serialize(*self, parcel)
    }
}

impl<T: SerializeOption + ?Sized> SerializeOption for &T {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        SerializeOption::serialize_option(this.map(|inner| &**inner), parcel)
    }
}

impl<S: SerializeOption> Serialize for Option<S> {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        SerializeOption::serialize_option(self.as_ref(), parcel)
    }
}

impl<D: DeserializeOption> Deserialize for Option<D> {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        DeserializeOption::deserialize_option(parcel)
    }
}

impl<S: SerializeOption> SerializeArray for Option<S> {}

impl<D: DeserializeOption> DeserializeArray for Option<D> {}

impl<T: SerializeArray> Serialize for [T] {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        SerializeArray::serialize_array(self, parcel)
    }
}

impl<T: SerializeArray> Serialize for Vec<T> {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        SerializeArray::serialize_array(&self[..], parcel)
    }
}

impl<T: SerializeArray> SerializeOption for [T] {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        match this {
            None => parcel.write_i32(-1),
            Some(slice) => SerializeArray::serialize_array(slice, parcel),
        }
    }
}

impl<T: SerializeArray> SerializeOption for Vec<T> {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        SerializeOption::serialize_option(this.map(|v| &v[..]), parcel)
    }
}

impl<T: DeserializeArray> Deserialize for Vec<T> {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        DeserializeArray::deserialize_array(parcel)?.ok_or(StatusCode::UNEXPECTED_NULL)
    }
}

impl<T: DeserializeArray> DeserializeOption for Vec<T> {
    fn deserialize_option(parcel: &Parcel) -> Result<Option<Self>> {
        DeserializeArray::deserialize_array(parcel)
    }
}

/// Write a packed scalar array: an `i32` byte length, the packed elements,
/// and zero padding to the next 4-byte boundary.
fn serialize_packed<T: Copy>(
    slice: &[T],
    width: usize,
    parcel: &mut Parcel,
    mut put: impl FnMut(T, &mut Vec<u8>),
) -> Result<()> {
    let byte_len = slice.len().checked_mul(width).ok_or(StatusCode::BAD_VALUE)?;
    parcel.write_i32(i32::try_from(byte_len).map_err(|_| StatusCode::BAD_VALUE)?)?;
    let mut bytes = Vec::with_capacity(byte_len);
    for &item in slice {
        put(item, &mut bytes);
    }
    parcel.write_padded_data(&bytes);
    Ok(())
}

/// Read a packed scalar array written by [`serialize_packed`].
fn deserialize_packed<T>(
    parcel: &Parcel,
    width: usize,
    mut get: impl FnMut(&[u8]) -> T,
) -> Result<Option<Vec<T>>> {
    let byte_len = parcel.read_i32()?;
    if byte_len < 0 {
        return Ok(None);
    }
    let byte_len = byte_len as usize;
    if byte_len % width != 0 {
        return Err(StatusCode::BAD_VALUE);
    }
    let data = parcel.read_data(pad_size(byte_len))?;
    Ok(Some(data[..byte_len].chunks_exact(width).map(|chunk| get(chunk)).collect()))
}

macro_rules! parcelable_scalar {
    ($ty:ty, $write_fn:ident, $read_fn:ident, $width:expr) => {
        impl Serialize for $ty {
            fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
                parcel.$write_fn(*self)
            }
        }

        impl Deserialize for $ty {
            fn deserialize(parcel: &Parcel) -> Result<Self> {
                parcel.$read_fn()
            }
        }

        impl SerializeArray for $ty {
            fn serialize_array(slice: &[Self], parcel: &mut Parcel) -> Result<()> {
                serialize_packed(slice, $width, parcel, |item, out| {
                    out.extend_from_slice(&item.to_le_bytes())
                })
            }
        }

        impl DeserializeArray for $ty {
            fn deserialize_array(parcel: &Parcel) -> Result<Option<Vec<Self>>> {
                deserialize_packed(parcel, $width, |chunk| {
                    let mut bytes = [0u8; $width];
                    bytes.copy_from_slice(chunk);
                    <$ty>::from_le_bytes(bytes)
                })
            }
        }
    };
}

parcelable_scalar!(i8, write_i8, read_i8, 1);
parcelable_scalar!(u8, write_u8, read_u8, 1);
parcelable_scalar!(i16, write_i16, read_i16, 2);
parcelable_scalar!(u16, write_u16, read_u16, 2);
parcelable_scalar!(i32, write_i32, read_i32, 4);
parcelable_scalar!(u32, write_u32, read_u32, 4);
parcelable_scalar!(i64, write_i64, read_i64, 8);
parcelable_scalar!(u64, write_u64, read_u64, 8);
parcelable_scalar!(f32, write_f32, read_f32, 4);
parcelable_scalar!(f64, write_f64, read_f64, 8);

impl Serialize for bool {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_bool(*self)
    }
}

impl Deserialize for bool {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        parcel.read_bool()
    }
}

impl SerializeArray for bool {
    fn serialize_array(slice: &[Self], parcel: &mut Parcel) -> Result<()> {
        serialize_packed(slice, 1, parcel, |item, out| out.push(item as u8))
    }
}

impl DeserializeArray for bool {
    fn deserialize_array(parcel: &Parcel) -> Result<Option<Vec<Self>>> {
        deserialize_packed(parcel, 1, |chunk| chunk[0] != 0)
    }
}

impl Serialize for str {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(self)
    }
}

impl SerializeOption for str {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        match this {
            None => parcel.write_i32(-1),
            Some(s) => parcel.write_string(s),
        }
    }
}

impl SerializeArray for &str {}

impl Serialize for String {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(self)
    }
}

impl SerializeOption for String {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        SerializeOption::serialize_option(this.map(String::as_str), parcel)
    }
}

impl SerializeArray for String {}

impl Deserialize for String {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        parcel.read_string()?.ok_or(StatusCode::UNEXPECTED_NULL)
    }
}

impl DeserializeOption for String {
    fn deserialize_option(parcel: &Parcel) -> Result<Option<Self>> {
        parcel.read_string()
    }
}

impl DeserializeArray for String {}

impl Serialize for SpIBinder {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_binder(Some(self))
    }
}

impl SerializeOption for SpIBinder {
    fn serialize_option(this: Option<&Self>, parcel: &mut Parcel) -> Result<()> {
        parcel.write_binder(this)
    }
}

impl SerializeArray for SpIBinder {}

impl Deserialize for SpIBinder {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        parcel.read_binder()?.ok_or(StatusCode::UNEXPECTED_NULL)
    }
}

impl DeserializeOption for SpIBinder {
    fn deserialize_option(parcel: &Parcel) -> Result<Option<Self>> {
        parcel.read_binder()
    }
}

impl DeserializeArray for SpIBinder {}
