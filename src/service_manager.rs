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

//! The process-wide service registry: named binder handles with dump
//! priorities, lookups, and bounded waiting for registration.

use crate::binder::FromIBinder;
use crate::error::{Result, StatusCode};
use crate::proxy::SpIBinder;

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant};

/// How long [`ServiceManager::get_service`] waits for a name to appear.
const GET_SERVICE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_SERVICE_NAME_LEN: usize = 127;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFlags {
    /// Allows services to dump sections according to priorities.
    PriorityCritical = 1 << 0,
    PriorityHigh = 1 << 1,
    PriorityNormal = 1 << 2,
    /// Services are by default registered with a Default dump priority.
    /// Default priority has the same priority as Normal priority but the
    /// services are not called with dump priority arguments.
    PriorityDefault = 1 << 3,
    PriorityAll = 0b1111,
    Proto = 1 << 4,
}

impl Default for DumpFlags {
    fn default() -> DumpFlags {
        DumpFlags::PriorityDefault
    }
}

struct ServiceEntry {
    binder: SpIBinder,
    // Recorded but not enforced: every caller in this process is trusted.
    #[allow(dead_code)]
    allow_isolated: bool,
    dump_flags: DumpFlags,
}

struct Registry {
    services: Mutex<HashMap<String, ServiceEntry>>,
    registered: Condvar,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        services: Mutex::new(HashMap::new()),
        registered: Condvar::new(),
    })
}

fn is_valid_service_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_SERVICE_NAME_LEN {
        return false;
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || "_-./:".contains(c))
}

/// Service manager for binder services.
pub struct ServiceManager;

impl ServiceManager {
    /// Return list of all existing services matching the given dump
    /// priority mask, in sorted order.
    pub fn list_services(&mut self, dump_flags: DumpFlags) -> Vec<String> {
        let services = registry().services.lock().unwrap();
        let mut names: Vec<String> = services
            .iter()
            .filter(|(_, entry)| entry.dump_flags as i32 & dump_flags as i32 != 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Retrieve an existing service, blocking for a few seconds if it
    /// doesn't yet exist.
    pub fn get_service(&self, name: &str) -> Option<SpIBinder> {
        let registry = registry();
        let deadline = Instant::now() + GET_SERVICE_TIMEOUT;
        let mut services = registry.services.lock().unwrap();
        loop {
            if let Some(entry) = services.get(name) {
                return Some(entry.binder.clone());
            }
            let timeout = deadline.checked_duration_since(Instant::now())?;
            let (guard, _) = registry.registered.wait_timeout(services, timeout).unwrap();
            services = guard;
        }
    }

    /// Retrieve an existing service, non-blocking.
    pub fn check_service(&self, name: &str) -> Option<SpIBinder> {
        let services = registry().services.lock().unwrap();
        services.get(name).map(|entry| entry.binder.clone())
    }

    /// Register a service.
    pub fn add_service(
        &mut self,
        name: &str,
        service: SpIBinder,
        allow_isolated: bool,
        dump_flags: DumpFlags,
    ) -> Result<()> {
        if !is_valid_service_name(name) {
            log::error!("Attempting to add a service with an invalid name: {}", name);
            return Err(StatusCode::BAD_VALUE);
        }
        let registry = registry();
        {
            let mut services = registry.services.lock().unwrap();
            services.insert(
                name.to_string(),
                ServiceEntry { binder: service, allow_isolated, dump_flags },
            );
        }
        registry.registered.notify_all();
        Ok(())
    }

    /// Efficiently wait for a service, with no deadline.
    pub fn wait_for_service(&mut self, name: &str) -> Option<SpIBinder> {
        let registry = registry();
        let mut services = registry.services.lock().unwrap();
        loop {
            if let Some(entry) = services.get(name) {
                return Some(entry.binder.clone());
            }
            services = registry.registered.wait(services).unwrap();
        }
    }

    /// Check if a service is declared.
    ///
    /// If this returns true, [`wait_for_service`](Self::wait_for_service)
    /// should always be able to return the service.
    pub fn is_declared(&mut self, name: &str) -> bool {
        registry().services.lock().unwrap().contains_key(name)
    }
}

/// Register a new service with the default service manager.
pub fn add_service(identifier: &str, binder: SpIBinder) -> Result<()> {
    let mut sm = ServiceManager;
    sm.add_service(identifier, binder, false, DumpFlags::PriorityDefault)
}

/// Retrieve an existing service. Blocks for a few seconds if the service
/// does not yet exist, then fails with `NAME_NOT_FOUND`.
pub fn get_service(name: &str) -> Result<SpIBinder> {
    ServiceManager.get_service(name).ok_or(StatusCode::NAME_NOT_FOUND)
}

/// Retrieve an existing service without waiting for it.
pub fn check_service(name: &str) -> Option<SpIBinder> {
    ServiceManager.check_service(name)
}

/// Wait for a service to be registered, however long that takes.
pub fn wait_for_service(name: &str) -> Result<SpIBinder> {
    let mut sm = ServiceManager;
    sm.wait_for_service(name).ok_or(StatusCode::NAME_NOT_FOUND)
}

/// Retrieve an existing service and convert it to the given interface.
pub fn get_interface<T: FromIBinder + ?Sized>(name: &str) -> Result<Box<T>> {
    get_service(name)?.into_interface()
}
