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

//! Container for messages that are sent via binder.

use crate::error::{Result, StatusCode};
use crate::proxy::SpIBinder;
use crate::state::ProcessState;

use std::cell::Cell;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;

mod parcelable;

pub use self::parcelable::{
    Deserialize, DeserializeArray, DeserializeOption, Serialize, SerializeArray, SerializeOption,
};

/// Container for a message (data and object references) that can be sent
/// through binder.
///
/// A `Parcel` can contain both flattened data that will be unflattened on the
/// other side of the transaction (using the various methods here for writing
/// specific types, or the general [`Serialize`]/[`Deserialize`] traits), and
/// references to live binder objects that will result in the other side
/// receiving a proxy connected with the original binder in the parcel.
///
/// Values are always 4-byte aligned. The read cursor is interior state so
/// that reading only requires a shared reference, matching how replies are
/// consumed by many readers of the same parcel.
pub struct Parcel {
    data: Vec<u8>,
    pos: Cell<usize>,
    // Object table: offset of a binder tag in `data` -> the live binder
    // written there. Raw data accessors never expose these.
    objects: BTreeMap<usize, SpIBinder>,
}

/// Round `len` up to the next 4-byte boundary.
fn pad_size(len: usize) -> usize {
    (len + 3) & !3
}

impl Parcel {
    pub fn new() -> Self {
        Self { data: Vec::new(), pos: Cell::new(0), objects: BTreeMap::new() }
    }

    /// The flattened data, without the object table.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the total amount of data contained in the parcel.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Returns the amount of data remaining to be read from the parcel. That
    /// is, `data_size() - data_position()`.
    pub fn data_avail(&self) -> usize {
        self.data.len() - self.pos.get()
    }

    /// Returns the current position in the parcel data. Never more than
    /// `data_size()`.
    pub fn data_position(&self) -> usize {
        self.pos.get()
    }

    /// Returns the total amount of allocated space in the parcel. This is
    /// always >= `data_size()`.
    pub fn data_capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Grow the allocated space of the parcel. Shrinking below the current
    /// size is a no-op.
    pub fn set_data_capacity(&mut self, size: usize) -> Result<()> {
        if size > self.data.len() {
            self.data.reserve(size - self.data.len());
        }
        Ok(())
    }

    /// Move the current read/write position in the parcel.
    ///
    /// The position must land inside the written data; anywhere past the end
    /// is `BAD_VALUE`.
    pub fn set_data_position(&self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(StatusCode::BAD_VALUE);
        }
        self.pos.set(pos);
        Ok(())
    }

    /// Replace the contents of the parcel with raw data.
    ///
    /// The object table is cleared; raw bytes can never introduce object
    /// references.
    pub fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data.clear();
        self.data.extend_from_slice(data);
        self.pos.set(0);
        self.objects.clear();
        Ok(())
    }

    /// Append a region of another parcel at the current position, including
    /// the object references contained in that region. The range is bounds
    /// checked and yields `BAD_VALUE` when it falls outside `parcel`'s data.
    pub fn append_from(&mut self, parcel: &Parcel, start: usize, len: usize) -> Result<()> {
        let end = start.checked_add(len).ok_or(StatusCode::BAD_VALUE)?;
        if end > parcel.data.len() {
            return Err(StatusCode::BAD_VALUE);
        }
        let base = self.pos.get();
        self.write_data(&parcel.data[start..end]);
        for (&offset, binder) in parcel.objects.range(start..end) {
            self.objects.insert(base + (offset - start), binder.clone());
        }
        Ok(())
    }

    /// Discard all data and object references.
    pub fn free_data(&mut self) {
        self.data.clear();
        self.pos.set(0);
        self.objects.clear();
    }

    /// Number of object references currently held by the parcel.
    pub fn objects_count(&self) -> usize {
        self.objects.len()
    }

    /// Writes raw bytes at the current position, overwriting existing data
    /// and extending the parcel as needed.
    fn write_data(&mut self, bytes: &[u8]) {
        let pos = self.pos.get();
        let end = pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[pos..end].copy_from_slice(bytes);
        self.pos.set(end);
    }

    /// Writes raw bytes followed by zero padding up to the next 4-byte
    /// boundary.
    fn write_padded_data(&mut self, bytes: &[u8]) {
        self.write_data(bytes);
        let padding = pad_size(bytes.len()) - bytes.len();
        if padding > 0 {
            self.write_data(&[0u8; 3][..padding]);
        }
    }

    /// Reads `len` raw bytes starting at the current position.
    fn read_data(&self, len: usize) -> Result<&[u8]> {
        let pos = self.pos.get();
        let end = pos.checked_add(len).ok_or(StatusCode::BAD_VALUE)?;
        if end > self.data.len() {
            return Err(StatusCode::NOT_ENOUGH_DATA);
        }
        self.pos.set(end);
        Ok(&self.data[pos..end])
    }

    fn read_array<const N: usize>(&self) -> Result<[u8; N]> {
        let bytes = self.read_data(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn write_i32(&mut self, val: i32) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    pub fn write_u32(&mut self, val: u32) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    pub fn write_i64(&mut self, val: i64) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    pub fn write_u64(&mut self, val: u64) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    pub fn write_f32(&mut self, val: f32) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    pub fn write_f64(&mut self, val: f64) -> Result<()> {
        self.write_data(&val.to_le_bytes());
        Ok(())
    }

    /// Booleans occupy a full 4-byte slot when written on their own.
    pub fn write_bool(&mut self, val: bool) -> Result<()> {
        self.write_i32(val as i32)
    }

    pub fn write_u8(&mut self, val: u8) -> Result<()> {
        self.write_i32(val as i32)
    }

    pub fn write_i8(&mut self, val: i8) -> Result<()> {
        self.write_i32(val as i32)
    }

    pub fn write_u16(&mut self, val: u16) -> Result<()> {
        self.write_i32(val as i32)
    }

    pub fn write_i16(&mut self, val: i16) -> Result<()> {
        self.write_i32(val as i32)
    }

    pub fn read_i32(&self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_bool(&self) -> Result<bool> {
        Ok(self.read_i32()? != 0)
    }

    pub fn read_u8(&self) -> Result<u8> {
        Ok(self.read_i32()? as u8)
    }

    pub fn read_i8(&self) -> Result<i8> {
        Ok(self.read_i32()? as i8)
    }

    pub fn read_u16(&self) -> Result<u16> {
        Ok(self.read_i32()? as u16)
    }

    pub fn read_i16(&self) -> Result<i16> {
        Ok(self.read_i32()? as i16)
    }

    /// Write a string as its byte length, UTF-8 contents with a trailing NUL,
    /// and padding to the next 4-byte boundary.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        let len = i32::try_from(s.len()).map_err(|_| StatusCode::BAD_VALUE)?;
        self.write_i32(len)?;
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        self.write_padded_data(&bytes);
        Ok(())
    }

    /// Read a string written by [`write_string`](Self::write_string). Returns
    /// `None` for the null-string sentinel (a negative length).
    pub fn read_string(&self) -> Result<Option<String>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        let padded = self.read_data(pad_size(len + 1))?;
        if padded[len] != 0 {
            return Err(StatusCode::BAD_VALUE);
        }
        let s = std::str::from_utf8(&padded[..len]).map_err(|_| StatusCode::BAD_VALUE)?;
        Ok(Some(s.to_string()))
    }

    /// Write a strong binder reference, or the null reference for `None`.
    ///
    /// The byte stream only carries a presence tag; the binder itself goes
    /// into the parcel's object table, keyed by the tag's offset.
    pub fn write_binder(&mut self, binder: Option<&SpIBinder>) -> Result<()> {
        match binder {
            Some(binder) => {
                let offset = self.pos.get();
                self.write_i32(1)?;
                self.objects.insert(offset, binder.clone());
            }
            None => {
                self.write_i32(0)?;
            }
        }
        Ok(())
    }

    /// Read a strong binder reference written by
    /// [`write_binder`](Self::write_binder).
    ///
    /// A non-null reference is always returned in proxy form: pulling a
    /// binder out of a parcel models its arrival in a receiving process. A
    /// presence tag without a matching object table entry (for example after
    /// `set_data` with raw bytes) is `BAD_TYPE`.
    pub fn read_binder(&self) -> Result<Option<SpIBinder>> {
        let offset = self.pos.get();
        let tag = self.read_i32()?;
        if tag == 0 {
            return Ok(None);
        }
        let binder = self.objects.get(&offset).ok_or(StatusCode::BAD_TYPE)?;
        Ok(Some(ProcessState::proxy_for(binder)))
    }

    /// Writes the transaction header identifying the destination interface.
    pub fn write_interface_token(&mut self, descriptor: &str) -> Result<()> {
        self.write_string(descriptor)
    }

    /// Parses the transaction header, returning true if the interface name in
    /// the header matches the interface expected by the callee.
    pub fn enforce_interface(&self, descriptor: &str) -> bool {
        match self.read_string() {
            Ok(Some(token)) if token == descriptor => true,
            Ok(token) => {
                log::warn!(
                    "Interface token mismatch: expected {:?}, got {:?}",
                    descriptor,
                    token
                );
                false
            }
            Err(status) => {
                log::warn!("Failed to read interface token: {}", status);
                false
            }
        }
    }

    /// Reads any parcelable type implementing [`Deserialize`] from the
    /// current position.
    pub fn read<D: Deserialize>(&self) -> Result<D> {
        D::deserialize(self)
    }

    /// Writes any parcelable type implementing [`Serialize`] at the current
    /// position.
    pub fn write<S: Serialize + ?Sized>(&mut self, parcelable: &S) -> Result<()> {
        parcelable.serialize(self)
    }
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Parcel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parcel")
            .field("data_size", &self.data_size())
            .field("data_position", &self.data_position())
            .field("objects", &self.objects.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::Interface;
    use crate::native::Binder;

    #[test]
    fn test_data_positions() {
        let mut parcel = Parcel::new();
        assert_eq!(parcel.data_size(), 0);
        assert_eq!(parcel.data_avail(), 0);
        assert_eq!(parcel.data_position(), 0);

        parcel.write_i32(1).unwrap();
        parcel.write_i64(2).unwrap();
        assert_eq!(parcel.data_size(), 12);
        assert_eq!(parcel.data_position(), 12);
        assert_eq!(parcel.data_avail(), 0);

        parcel.set_data_position(0).unwrap();
        assert_eq!(parcel.data_avail(), 12);
        assert_eq!(parcel.read_i32().unwrap(), 1);
        assert_eq!(parcel.read_i64().unwrap(), 2);

        assert_eq!(parcel.set_data_position(13), Err(StatusCode::BAD_VALUE));
        assert_eq!(parcel.data_position(), 12);
    }

    #[test]
    fn test_read_past_end() {
        let mut parcel = Parcel::new();
        parcel.write_i32(117).unwrap();
        parcel.set_data_position(0).unwrap();
        assert_eq!(parcel.read_i64(), Err(StatusCode::NOT_ENOUGH_DATA));
        // A failed read does not move the cursor.
        assert_eq!(parcel.read_i32().unwrap(), 117);
        assert_eq!(parcel.read_i32(), Err(StatusCode::NOT_ENOUGH_DATA));
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut parcel = Parcel::new();
        parcel.write_i32(1).unwrap();
        parcel.write_i32(2).unwrap();
        parcel.set_data_position(0).unwrap();
        parcel.write_i32(3).unwrap();
        assert_eq!(parcel.data_size(), 8);
        parcel.set_data_position(0).unwrap();
        assert_eq!(parcel.read_i32().unwrap(), 3);
        assert_eq!(parcel.read_i32().unwrap(), 2);
    }

    #[test]
    fn test_narrow_scalars_use_full_slots() {
        let mut parcel = Parcel::new();
        parcel.write_bool(true).unwrap();
        parcel.write_u8(255).unwrap();
        parcel.write_i16(-2).unwrap();
        assert_eq!(parcel.data_size(), 12);
        parcel.set_data_position(0).unwrap();
        assert!(parcel.read_bool().unwrap());
        assert_eq!(parcel.read_u8().unwrap(), 255);
        assert_eq!(parcel.read_i16().unwrap(), -2);
    }

    #[test]
    fn test_string_layout() {
        let mut parcel = Parcel::new();
        parcel.write_string("str4").unwrap();
        // length + 4 bytes + NUL padded to 8.
        assert_eq!(parcel.data(), [4, 0, 0, 0, b's', b't', b'r', b'4', 0, 0, 0, 0]);
        parcel.set_data_position(0).unwrap();
        assert_eq!(parcel.read_string().unwrap().as_deref(), Some("str4"));

        let mut parcel = Parcel::new();
        parcel.write_i32(-1).unwrap();
        parcel.set_data_position(0).unwrap();
        assert_eq!(parcel.read_string().unwrap(), None);
    }

    #[test]
    fn test_set_data_clears_objects() {
        let service = Binder::new(());
        let mut parcel = Parcel::new();
        parcel.write_binder(Some(&service.as_binder())).unwrap();
        assert_eq!(parcel.objects_count(), 1);

        let raw = parcel.data().to_vec();
        parcel.set_data(&raw).unwrap();
        assert_eq!(parcel.objects_count(), 0);
        // The tag survives but the reference does not.
        assert_eq!(parcel.read_binder(), Err(StatusCode::BAD_TYPE));
    }

    #[test]
    fn test_append_from_rebases_objects() {
        let service = Binder::new(());
        let mut source = Parcel::new();
        source.write_i32(42).unwrap();
        source.write_binder(Some(&service.as_binder())).unwrap();

        let mut dest = Parcel::new();
        dest.write_i32(1).unwrap();
        dest.append_from(&source, 0, source.data_size()).unwrap();
        assert_eq!(dest.objects_count(), 1);

        dest.set_data_position(0).unwrap();
        assert_eq!(dest.read_i32().unwrap(), 1);
        assert_eq!(dest.read_i32().unwrap(), 42);
        assert!(dest.read_binder().unwrap().is_some());

        assert_eq!(dest.append_from(&source, 4, source.data_size()), Err(StatusCode::BAD_VALUE));
    }

    #[test]
    fn test_interface_token() {
        let mut parcel = Parcel::new();
        parcel.write_interface_token("test.Interface").unwrap();
        parcel.set_data_position(0).unwrap();
        assert!(parcel.enforce_interface("test.Interface"));

        parcel.set_data_position(0).unwrap();
        assert!(!parcel.enforce_interface("test.OtherInterface"));
    }

    #[test]
    fn test_capacity() {
        let mut parcel = Parcel::new();
        parcel.set_data_capacity(64).unwrap();
        assert!(parcel.data_capacity() >= 64);
        assert_eq!(parcel.data_size(), 0);
    }
}
