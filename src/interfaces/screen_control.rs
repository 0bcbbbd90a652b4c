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

//! ScreenControlService interface.

use crate::binder::{IBinder, Interface, Proxy, TransactionCode};
use crate::declare_binder_interface;
use crate::error::{Result, StatusCode};
use crate::native::Binder;
use crate::parcel::Parcel;
use crate::proxy::SpIBinder;

const SCREEN_CAP: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION;
const SCREEN_REC: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION + 1;

/// Screen capture and recording control.
///
/// The `i32` these methods return is the service's own status: 0 means the
/// capture or recording was started. A non-zero value is an application
/// error reported by a transaction that itself succeeded.
pub trait IScreenControlService: Interface {
    /// Capture the screen region bounded by the given corners, scaled to
    /// `width` x `height`, into `file_name`.
    #[allow(clippy::too_many_arguments)]
    fn start_screen_cap(
        &self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        width: i32,
        height: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32>;

    /// Record the screen into `file_name` until `limit_time_sec` elapses.
    #[allow(clippy::too_many_arguments)]
    fn start_screen_record(
        &self,
        width: i32,
        height: i32,
        frame_rate: i32,
        bit_rate: i32,
        limit_time_sec: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32>;
}

declare_binder_interface! {
    IScreenControlService["droidlogic.IScreenControlService"] {
        native: BnScreenControlService(on_transact),
        proxy: BpScreenControlService,
    }
}

fn on_transact(
    service: &dyn IScreenControlService,
    code: TransactionCode,
    data: &Parcel,
    reply: &mut Parcel,
) -> Result<()> {
    if !data.enforce_interface(<BpScreenControlService as Proxy>::get_descriptor()) {
        return Err(StatusCode::PERMISSION_DENIED);
    }
    match code {
        SCREEN_CAP => {
            let left = data.read()?;
            let top = data.read()?;
            let right = data.read()?;
            let bottom = data.read()?;
            let width = data.read()?;
            let height = data.read()?;
            let source_type = data.read()?;
            let file_name: String = data.read()?;
            let status = service.start_screen_cap(
                left,
                top,
                right,
                bottom,
                width,
                height,
                source_type,
                &file_name,
            )?;
            reply.write(&status)
        }
        SCREEN_REC => {
            let width = data.read()?;
            let height = data.read()?;
            let frame_rate = data.read()?;
            let bit_rate = data.read()?;
            let limit_time_sec = data.read()?;
            let source_type = data.read()?;
            let file_name: String = data.read()?;
            let status = service.start_screen_record(
                width,
                height,
                frame_rate,
                bit_rate,
                limit_time_sec,
                source_type,
                &file_name,
            )?;
            reply.write(&status)
        }
        _ => Err(StatusCode::UNKNOWN_TRANSACTION),
    }
}

impl IScreenControlService for BpScreenControlService {
    fn start_screen_cap(
        &self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        width: i32,
        height: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32> {
        let reply = self.binder.transact(SCREEN_CAP, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())?;
            data.write(&left)?;
            data.write(&top)?;
            data.write(&right)?;
            data.write(&bottom)?;
            data.write(&width)?;
            data.write(&height)?;
            data.write(&source_type)?;
            data.write(file_name)
        })?;
        reply.read()
    }

    fn start_screen_record(
        &self,
        width: i32,
        height: i32,
        frame_rate: i32,
        bit_rate: i32,
        limit_time_sec: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32> {
        let reply = self.binder.transact(SCREEN_REC, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())?;
            data.write(&width)?;
            data.write(&height)?;
            data.write(&frame_rate)?;
            data.write(&bit_rate)?;
            data.write(&limit_time_sec)?;
            data.write(&source_type)?;
            data.write(file_name)
        })?;
        reply.read()
    }
}

impl IScreenControlService for Binder<BnScreenControlService> {
    fn start_screen_cap(
        &self,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        width: i32,
        height: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32> {
        self.0.start_screen_cap(left, top, right, bottom, width, height, source_type, file_name)
    }

    fn start_screen_record(
        &self,
        width: i32,
        height: i32,
        frame_rate: i32,
        bit_rate: i32,
        limit_time_sec: i32,
        source_type: i32,
        file_name: &str,
    ) -> Result<i32> {
        self.0.start_screen_record(
            width,
            height,
            frame_rate,
            bit_rate,
            limit_time_sec,
            source_type,
            file_name,
        )
    }
}
