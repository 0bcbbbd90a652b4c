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

//! Device interface, version 1.0.

use crate::binder::{IBinder, Interface, Proxy, TransactionCode};
use crate::error::{Result, StatusCode};
use crate::native::Binder;
use crate::parcel::{Deserialize, Parcel, Serialize};
use crate::proxy::SpIBinder;
use crate::{declare_binder_enum, declare_binder_interface};

/// Interface descriptor of this version.
pub const DESCRIPTOR: &str = "android.hardware.device@1.0::IDevice";

const GET_CAPABILITIES: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION;
const PREPARE_MODEL: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION + 1;

declare_binder_enum! {
    ErrorStatus : i32 {
        NONE = 0,
        DEVICE_UNAVAILABLE = 1,
        GENERAL_FAILURE = 2,
        OUTPUT_INSUFFICIENT_SIZE = 3,
        INVALID_ARGUMENT = 4,
    }
}

/// Performance of an operation class. Lower is better.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PerformanceInfo {
    pub exec_time: f32,
    pub power_usage: f32,
}

impl Serialize for PerformanceInfo {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write(&self.exec_time)?;
        parcel.write(&self.power_usage)
    }
}

impl Deserialize for PerformanceInfo {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        Ok(PerformanceInfo { exec_time: parcel.read()?, power_usage: parcel.read()? })
    }
}

/// What the device can do, and how well.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub float32_performance: PerformanceInfo,
}

impl Serialize for Capabilities {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write(&self.float32_performance)
    }
}

impl Deserialize for Capabilities {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        Ok(Capabilities { float32_performance: parcel.read()? })
    }
}

/// A model to be prepared for execution on a device.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Model {
    pub operations: Vec<i32>,
}

impl Serialize for Model {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write(&self.operations)
    }
}

impl Deserialize for Model {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        Ok(Model { operations: parcel.read()? })
    }
}

/// A device that can prepare models for execution.
pub trait IDevice: Interface {
    /// Performance capabilities of this device.
    fn get_capabilities(&self) -> Result<Capabilities>;

    /// Prepare the model for execution. `ErrorStatus::NONE` means prepared;
    /// any other status is the device's own verdict on the model, reported
    /// by a transaction that itself succeeded.
    fn prepare_model(&self, model: &Model) -> Result<ErrorStatus>;
}

declare_binder_interface! {
    IDevice[DESCRIPTOR] {
        native: BnDevice(on_transact),
        proxy: BpDevice,
    }
}

fn on_transact(
    service: &dyn IDevice,
    code: TransactionCode,
    data: &Parcel,
    reply: &mut Parcel,
) -> Result<()> {
    if !data.enforce_interface(<BpDevice as Proxy>::get_descriptor()) {
        return Err(StatusCode::PERMISSION_DENIED);
    }
    match code {
        GET_CAPABILITIES => {
            let capabilities = service.get_capabilities()?;
            reply.write(&capabilities)
        }
        PREPARE_MODEL => {
            let model: Model = data.read()?;
            let status = service.prepare_model(&model)?;
            reply.write(&status)
        }
        _ => Err(StatusCode::UNKNOWN_TRANSACTION),
    }
}

impl IDevice for BpDevice {
    fn get_capabilities(&self) -> Result<Capabilities> {
        let reply = self.binder.transact(GET_CAPABILITIES, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())
        })?;
        reply.read()
    }

    fn prepare_model(&self, model: &Model) -> Result<ErrorStatus> {
        let reply = self.binder.transact(PREPARE_MODEL, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())?;
            data.write(model)
        })?;
        reply.read()
    }
}

impl IDevice for Binder<BnDevice> {
    fn get_capabilities(&self) -> Result<Capabilities> {
        self.0.get_capabilities()
    }

    fn prepare_model(&self, model: &Model) -> Result<ErrorStatus> {
        self.0.prepare_model(model)
    }
}
