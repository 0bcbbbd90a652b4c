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

//! Versioned hardware device interface.
//!
//! Each interface version lives in its own module, as a separate descriptor
//! with its own proxy and stub. [`VersionedDevice`] binds to the newest
//! version a service implements and adapts calls across versions.

pub mod v1_0;
pub mod v1_1;

use crate::error::Result;
use crate::proxy::SpIBinder;
use crate::service_manager;

use self::v1_1::ExecutionPreference;

enum DeviceVersion {
    V1_0(Box<dyn v1_0::IDevice>),
    V1_1(Box<dyn v1_1::IDevice>),
}

/// A handle to a device service of any supported version.
///
/// Callers program against the newest interface; calls are forwarded
/// directly when the service implements it and adapted down when the
/// service only implements an older version. Requests an older service
/// cannot honor fail with [`ErrorStatus::GENERAL_FAILURE`](v1_0::ErrorStatus)
/// rather than being silently degraded.
pub struct VersionedDevice {
    device: DeviceVersion,
}

impl VersionedDevice {
    /// Locate the service registered under `name` and bind to the newest
    /// interface version it implements.
    pub fn new(name: &str) -> Result<VersionedDevice> {
        Self::from_binder(service_manager::get_service(name)?)
    }

    /// Bind to the newest interface version of an already-located service.
    /// Fails with `BAD_TYPE` if the binder implements no known version.
    pub fn from_binder(binder: SpIBinder) -> Result<VersionedDevice> {
        let device = match binder.clone().into_interface::<dyn v1_1::IDevice>() {
            Ok(device) => DeviceVersion::V1_1(device),
            Err(_) => DeviceVersion::V1_0(binder.into_interface::<dyn v1_0::IDevice>()?),
        };
        Ok(VersionedDevice { device })
    }

    /// The descriptor of the interface version this handle is bound to.
    pub fn version(&self) -> &'static str {
        match &self.device {
            DeviceVersion::V1_0(_) => v1_0::DESCRIPTOR,
            DeviceVersion::V1_1(_) => v1_1::DESCRIPTOR,
        }
    }

    /// Performance capabilities of the device, in the newest form. A 1.0
    /// service reports its float32 performance for relaxed execution too,
    /// since that is how it would run such a model.
    pub fn get_capabilities(&self) -> Result<v1_1::Capabilities> {
        match &self.device {
            DeviceVersion::V1_1(device) => device.get_capabilities_1_1(),
            DeviceVersion::V1_0(device) => {
                device.get_capabilities().map(|capabilities| v1_1::upgrade_capabilities(&capabilities))
            }
        }
    }

    /// Ask the device to prepare `model` for execution.
    ///
    /// A model that needs features the bound version does not have fails
    /// with `GENERAL_FAILURE`: an older device must never be handed a model
    /// whose required semantics it would not preserve.
    pub fn prepare_model(
        &self,
        model: &v1_1::Model,
        preference: ExecutionPreference,
    ) -> Result<v1_0::ErrorStatus> {
        match &self.device {
            DeviceVersion::V1_1(device) => device.prepare_model_1_1(model, preference),
            DeviceVersion::V1_0(device) => {
                if v1_1::compliant_with_v1_0(model) {
                    device.prepare_model(&v1_1::downgrade_model(model))
                } else {
                    log::error!(
                        "Cannot prepare a model requiring relaxed computation on a {} service",
                        v1_0::DESCRIPTOR
                    );
                    Ok(v1_0::ErrorStatus::GENERAL_FAILURE)
                }
            }
        }
    }
}
