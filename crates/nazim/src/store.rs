//! Persistence of the managed service list.
//!
//! The store is a flat YAML list of [`Service`] records kept in `services.yaml` under the
//! config directory. It is the user's declaration of what should exist; the native scheduler
//! remains the source of truth for what actually is installed and enabled.

use std::{collections::BTreeMap, fs, io::ErrorKind, path::PathBuf};

use tracing::debug;

use super::*;

/// The on-disk list of services, keyed by name.
#[derive(Debug)]
pub struct ServiceStore {
  path:     PathBuf,
  services: BTreeMap<String, Service>,
}

impl ServiceStore {
  /// Opens the store in `paths.config_dir`, creating the directory if needed.
  ///
  /// A missing file yields an empty store.
  ///
  /// # Errors
  ///
  /// Returns `NazimError` if the directory cannot be created, or the file exists but cannot
  /// be read or parsed.
  pub fn open(paths: &Paths) -> Result<Self, NazimError> {
    fs::create_dir_all(&paths.config_dir)?;
    let path = paths.config_file();

    let services = match fs::read_to_string(&path) {
      Ok(contents) if contents.trim().is_empty() => Vec::new(),
      Ok(contents) => serde_yaml::from_str::<Option<Vec<Service>>>(&contents)?.unwrap_or_default(),
      Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
      Err(e) => return Err(e.into()),
    };
    debug!("Loaded {} services from {}", services.len(), path.display());

    Ok(Self {
      path,
      services: services.into_iter().map(|service| (service.name.clone(), service)).collect(),
    })
  }

  /// Location of the YAML file.
  pub fn path(&self) -> &PathBuf { &self.path }

  /// Writes the list back to disk, sorted by name.
  pub fn save(&self) -> Result<(), NazimError> {
    let services: Vec<&Service> = self.services.values().collect();
    fs::write(&self.path, serde_yaml::to_string(&services)?)?;
    Ok(())
  }

  /// Validates and adds a new service, then saves.
  ///
  /// # Errors
  ///
  /// Returns [`NazimError::ServiceExists`] if the name, or another name that normalizes to the
  /// same native identifier, is taken. Returns a validation error for an invalid descriptor.
  pub fn add(&mut self, service: Service) -> Result<(), NazimError> {
    service.validate()?;
    if let Some(existing) = self.conflicting(&service.name) {
      return Err(NazimError::ServiceExists(existing.name.clone()));
    }
    self.services.insert(service.name.clone(), service);
    self.save()
  }

  /// Removes a service by name, then saves.
  pub fn remove(&mut self, name: &str) -> Result<Service, NazimError> {
    let removed =
      self.services.remove(name).ok_or_else(|| NazimError::UnknownService(name.to_string()))?;
    self.save()?;
    Ok(removed)
  }

  /// Validates and replaces an existing service, then saves.
  pub fn update(&mut self, service: Service) -> Result<(), NazimError> {
    service.validate()?;
    match self.services.get_mut(&service.name) {
      Some(existing) => *existing = service,
      None => return Err(NazimError::UnknownService(service.name)),
    }
    self.save()
  }

  /// Looks up a service by name.
  pub fn get(&self, name: &str) -> Result<&Service, NazimError> {
    self.services.get(name).ok_or_else(|| NazimError::UnknownService(name.to_string()))
  }

  /// Whether a service with this name is stored.
  pub fn contains(&self, name: &str) -> bool { self.services.contains_key(name) }

  /// The stored service that shares a native identifier with `name`, if any.
  ///
  /// `"my svc"` and `"mysvc"` both normalize to `mysvc`, so they would address the same task.
  pub fn conflicting(&self, name: &str) -> Option<&Service> {
    let safe = normalize::normalize(name);
    self.services.values().find(|service| normalize::normalize(&service.name) == safe)
  }

  /// All services sorted by name.
  pub fn list(&self) -> Vec<&Service> { self.services.values().collect() }
}
