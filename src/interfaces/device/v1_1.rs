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

//! Device interface, version 1.1.
//!
//! Adds relaxed float16 computation and an execution preference to version
//! 1.0. The error status type is shared with 1.0.

use crate::binder::{IBinder, Interface, Proxy, TransactionCode};
use crate::error::{Result, StatusCode};
use crate::native::Binder;
use crate::parcel::{Deserialize, Parcel, Serialize};
use crate::proxy::SpIBinder;
use crate::{declare_binder_enum, declare_binder_interface};

use super::v1_0::{self, ErrorStatus, PerformanceInfo};

/// Interface descriptor of this version.
pub const DESCRIPTOR: &str = "android.hardware.device@1.1::IDevice";

const GET_CAPABILITIES_1_1: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION;
const PREPARE_MODEL_1_1: TransactionCode = SpIBinder::FIRST_CALL_TRANSACTION + 1;

declare_binder_enum! {
    ExecutionPreference : i32 {
        LOW_POWER = 0,
        FAST_SINGLE_ANSWER = 1,
        SUSTAINED_SPEED = 2,
    }
}

/// What the device can do, and how well.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Capabilities {
    pub float32_performance: PerformanceInfo,
    pub relaxed_float32_to_float16_performance: PerformanceInfo,
}

impl Serialize for Capabilities {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write(&self.float32_performance)?;
        parcel.write(&self.relaxed_float32_to_float16_performance)
    }
}

impl Deserialize for Capabilities {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        Ok(Capabilities {
            float32_performance: parcel.read()?,
            relaxed_float32_to_float16_performance: parcel.read()?,
        })
    }
}

/// A model to be prepared for execution on a device.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Model {
    pub operations: Vec<i32>,
    /// Allow float32 operations to be calculated with half-precision ranges.
    pub relax_computation_float32_to_float16: bool,
}

impl Serialize for Model {
    fn serialize(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write(&self.operations)?;
        parcel.write(&self.relax_computation_float32_to_float16)
    }
}

impl Deserialize for Model {
    fn deserialize(parcel: &Parcel) -> Result<Self> {
        Ok(Model {
            operations: parcel.read()?,
            relax_computation_float32_to_float16: parcel.read()?,
        })
    }
}

/// A device that can prepare models for execution.
pub trait IDevice: Interface {
    /// Performance capabilities of this device.
    fn get_capabilities_1_1(&self) -> Result<Capabilities>;

    /// Prepare the model for execution, tuned for the given preference.
    /// `ErrorStatus::NONE` means prepared.
    fn prepare_model_1_1(
        &self,
        model: &Model,
        preference: ExecutionPreference,
    ) -> Result<ErrorStatus>;
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
        GET_CAPABILITIES_1_1 => {
            let capabilities = service.get_capabilities_1_1()?;
            reply.write(&capabilities)
        }
        PREPARE_MODEL_1_1 => {
            let model: Model = data.read()?;
            let preference: ExecutionPreference = data.read()?;
            let status = service.prepare_model_1_1(&model, preference)?;
            reply.write(&status)
        }
        _ => Err(StatusCode::UNKNOWN_TRANSACTION),
    }
}

impl IDevice for BpDevice {
    fn get_capabilities_1_1(&self) -> Result<Capabilities> {
        let reply = self.binder.transact(GET_CAPABILITIES_1_1, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())
        })?;
        reply.read()
    }

    fn prepare_model_1_1(
        &self,
        model: &Model,
        preference: ExecutionPreference,
    ) -> Result<ErrorStatus> {
        let reply = self.binder.transact(PREPARE_MODEL_1_1, 0, |data| {
            data.write_interface_token(<Self as Proxy>::get_descriptor())?;
            data.write(model)?;
            data.write(&preference)
        })?;
        reply.read()
    }
}

impl IDevice for Binder<BnDevice> {
    fn get_capabilities_1_1(&self) -> Result<Capabilities> {
        self.0.get_capabilities_1_1()
    }

    fn prepare_model_1_1(
        &self,
        model: &Model,
        preference: ExecutionPreference,
    ) -> Result<ErrorStatus> {
        self.0.prepare_model_1_1(model, preference)
    }
}

/// True if the model only uses features already present in version 1.0.
pub fn compliant_with_v1_0(model: &Model) -> bool {
    !model.relax_computation_float32_to_float16
}

/// Strip the 1.1 fields from a compliant model.
pub fn downgrade_model(model: &Model) -> v1_0::Model {
    v1_0::Model { operations: model.operations.clone() }
}

/// View 1.0 capabilities in the 1.1 shape. A 1.0 device executes relaxed
/// models at full precision, so its float32 performance is the honest
/// estimate for them.
pub fn upgrade_capabilities(capabilities: &v1_0::Capabilities) -> Capabilities {
    Capabilities {
        float32_performance: capabilities.float32_performance,
        relaxed_float32_to_float16_performance: capabilities.float32_performance,
    }
}
