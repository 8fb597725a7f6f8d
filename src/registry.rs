//! Reference registry - currencies, domiciles and institutions
//!
//! Holds the slowly-changing reference records every asset points into.
//! Upserts are idempotent by natural key: re-registering an identical
//! record is a no-op, a conflicting one is an integrity error.

use std::collections::HashMap;
use std::sync::RwLock;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SecmasterError};
use crate::types::{CountryCode, CurrencyCode, EntityId, Mic};

/// ISO 4217 currency record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub name: String,
}

/// ISO 3166 domicile record with its default currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domicile {
    pub country: CountryCode,
    /// ISO 3166 alpha-3 code
    pub alpha3: String,
    pub name: String,
    pub currency: CurrencyCode,
}

/// Role an institution plays in the master
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstitutionRole {
    Issuer,
    Exchange { mic: Mic },
}

/// Legal entity participating in the market (issuer or exchange)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Institution {
    pub id: EntityId,
    pub name: String,
    pub domicile: CountryCode,
    pub role: InstitutionRole,
    /// Registration number or similar, display only
    pub identity_code: Option<String>,
}

impl Institution {
    pub fn is_exchange(&self) -> bool {
        matches!(self.role, InstitutionRole::Exchange { .. })
    }

    pub fn is_issuer(&self) -> bool {
        matches!(self.role, InstitutionRole::Issuer)
    }

    pub fn mic(&self) -> Option<Mic> {
        match self.role {
            InstitutionRole::Exchange { mic } => Some(mic),
            InstitutionRole::Issuer => None,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    currencies: HashMap<CurrencyCode, Currency>,
    domiciles: HashMap<CountryCode, Domicile>,
    institutions: HashMap<EntityId, Institution>,
    /// (name, domicile) -> issuer id
    issuer_index: HashMap<(String, CountryCode), EntityId>,
    /// MIC -> exchange id
    exchange_index: HashMap<Mic, EntityId>,
    next_id: EntityId,
}

/// Central store for reference records
///
/// All maps live behind one lock so a natural-key check and the insert it
/// guards are atomic. Entity ids are allocated here and never reused.
pub struct ReferenceRegistry {
    inner: RwLock<RegistryInner>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Register a currency, or return silently if an identical record exists
    pub fn upsert_currency(&self, code: CurrencyCode, name: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(existing) = inner.currencies.get(&code) {
            if existing.name != name {
                return Err(SecmasterError::Integrity(format!(
                    "currency {} already registered as {:?}, got {:?}",
                    code, existing.name, name
                )));
            }
            debug!("Currency {} already registered", code);
            return Ok(());
        }
        info!("Registering currency {} ({})", code, name);
        inner.currencies.insert(
            code,
            Currency {
                code,
                name: name.to_string(),
            },
        );
        Ok(())
    }

    /// Register a domicile; its default currency must already exist
    pub fn upsert_domicile(
        &self,
        country: CountryCode,
        alpha3: &str,
        name: &str,
        currency: CurrencyCode,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.currencies.contains_key(&currency) {
            return Err(SecmasterError::Integrity(format!(
                "domicile {} references missing currency {}",
                country, currency
            )));
        }
        if let Some(existing) = inner.domiciles.get(&country) {
            if existing.alpha3 != alpha3 || existing.name != name || existing.currency != currency {
                return Err(SecmasterError::Integrity(format!(
                    "domicile {} already registered with conflicting attributes",
                    country
                )));
            }
            debug!("Domicile {} already registered", country);
            return Ok(());
        }
        info!("Registering domicile {} ({})", country, name);
        inner.domiciles.insert(
            country,
            Domicile {
                country,
                alpha3: alpha3.to_string(),
                name: name.to_string(),
                currency,
            },
        );
        Ok(())
    }

    /// Register an issuer keyed by (name, domicile)
    ///
    /// A present `identity_code` updates the stored one; `None` leaves it
    /// untouched.
    pub fn upsert_issuer(
        &self,
        name: &str,
        domicile: CountryCode,
        identity_code: Option<&str>,
    ) -> Result<EntityId> {
        let mut inner = self.inner.write().unwrap();
        if !inner.domiciles.contains_key(&domicile) {
            return Err(SecmasterError::Integrity(format!(
                "issuer {} references missing domicile {}",
                name, domicile
            )));
        }
        let key = (name.to_string(), domicile);
        if let Some(&id) = inner.issuer_index.get(&key) {
            if let Some(code) = identity_code {
                if let Some(existing) = inner.institutions.get_mut(&id) {
                    existing.identity_code = Some(code.to_string());
                }
            }
            debug!("Issuer {} ({}) already registered as {}", name, domicile, id);
            return Ok(id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        info!("Registering issuer {} ({}) as entity {}", name, domicile, id);
        inner.institutions.insert(
            id,
            Institution {
                id,
                name: name.to_string(),
                domicile,
                role: InstitutionRole::Issuer,
                identity_code: identity_code.map(str::to_string),
            },
        );
        inner.issuer_index.insert(key, id);
        Ok(id)
    }

    /// Register an exchange keyed by MIC
    pub fn upsert_exchange(&self, mic: Mic, name: &str, domicile: CountryCode) -> Result<EntityId> {
        let mut inner = self.inner.write().unwrap();
        if !inner.domiciles.contains_key(&domicile) {
            return Err(SecmasterError::Integrity(format!(
                "exchange {} references missing domicile {}",
                mic, domicile
            )));
        }
        if let Some(&id) = inner.exchange_index.get(&mic) {
            let existing = inner.institutions.get(&id).ok_or_else(|| {
                SecmasterError::ConsistencyFault(format!("exchange index points at missing entity {}", id))
            })?;
            if existing.name != name || existing.domicile != domicile {
                return Err(SecmasterError::Integrity(format!(
                    "exchange {} already registered with conflicting attributes",
                    mic
                )));
            }
            debug!("Exchange {} already registered as {}", mic, id);
            return Ok(id);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        info!("Registering exchange {} ({}) as entity {}", mic, name, id);
        inner.institutions.insert(
            id,
            Institution {
                id,
                name: name.to_string(),
                domicile,
                role: InstitutionRole::Exchange { mic },
                identity_code: None,
            },
        );
        inner.exchange_index.insert(mic, id);
        Ok(id)
    }

    /// Reload an institution persisted earlier, keeping its original id.
    /// The id allocator moves past the restored id so later registrations
    /// never collide.
    pub(crate) fn restore_institution(&self, institution: Institution) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.domiciles.contains_key(&institution.domicile) {
            return Err(SecmasterError::Integrity(format!(
                "entity {} references missing domicile {}",
                institution.id, institution.domicile
            )));
        }
        if inner.institutions.contains_key(&institution.id) {
            return Err(SecmasterError::Integrity(format!(
                "entity {} already registered",
                institution.id
            )));
        }
        match &institution.role {
            InstitutionRole::Issuer => {
                inner
                    .issuer_index
                    .insert((institution.name.clone(), institution.domicile), institution.id);
            }
            InstitutionRole::Exchange { mic } => {
                inner.exchange_index.insert(*mic, institution.id);
            }
        }
        inner.next_id = inner.next_id.max(institution.id + 1);
        inner.institutions.insert(institution.id, institution);
        Ok(())
    }

    pub fn get_currency(&self, code: CurrencyCode) -> Result<Currency> {
        self.inner
            .read()
            .unwrap()
            .currencies
            .get(&code)
            .cloned()
            .ok_or_else(|| SecmasterError::NotFound(format!("currency {}", code)))
    }

    pub fn get_domicile(&self, country: CountryCode) -> Result<Domicile> {
        self.inner
            .read()
            .unwrap()
            .domiciles
            .get(&country)
            .cloned()
            .ok_or_else(|| SecmasterError::NotFound(format!("domicile {}", country)))
    }

    pub fn get_institution(&self, id: EntityId) -> Result<Institution> {
        self.inner
            .read()
            .unwrap()
            .institutions
            .get(&id)
            .cloned()
            .ok_or_else(|| SecmasterError::NotFound(format!("entity {}", id)))
    }

    pub fn lookup_issuer(&self, name: &str, domicile: CountryCode) -> Result<Institution> {
        let inner = self.inner.read().unwrap();
        let id = inner
            .issuer_index
            .get(&(name.to_string(), domicile))
            .ok_or_else(|| SecmasterError::NotFound(format!("issuer {} ({})", name, domicile)))?;
        inner
            .institutions
            .get(id)
            .cloned()
            .ok_or_else(|| SecmasterError::ConsistencyFault(format!("issuer index points at missing entity {}", id)))
    }

    pub fn lookup_exchange(&self, mic: Mic) -> Result<Institution> {
        let inner = self.inner.read().unwrap();
        let id = inner
            .exchange_index
            .get(&mic)
            .ok_or_else(|| SecmasterError::NotFound(format!("exchange {}", mic)))?;
        inner
            .institutions
            .get(id)
            .cloned()
            .ok_or_else(|| SecmasterError::ConsistencyFault(format!("exchange index points at missing entity {}", id)))
    }

    pub fn has_currency(&self, code: CurrencyCode) -> bool {
        self.inner.read().unwrap().currencies.contains_key(&code)
    }

    pub fn has_domicile(&self, country: CountryCode) -> bool {
        self.inner.read().unwrap().domiciles.contains_key(&country)
    }

    pub fn has_institution(&self, id: EntityId) -> bool {
        self.inner.read().unwrap().institutions.contains_key(&id)
    }

    pub fn currencies(&self) -> Vec<Currency> {
        let mut out: Vec<_> = self.inner.read().unwrap().currencies.values().cloned().collect();
        out.sort_by_key(|c| c.code);
        out
    }

    pub fn domiciles(&self) -> Vec<Domicile> {
        let mut out: Vec<_> = self.inner.read().unwrap().domiciles.values().cloned().collect();
        out.sort_by_key(|d| d.country);
        out
    }

    pub fn issuers(&self) -> Vec<Institution> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .institutions
            .values()
            .filter(|e| e.is_issuer())
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    pub fn exchanges(&self) -> Vec<Institution> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .institutions
            .values()
            .filter(|e| e.is_exchange())
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    /// Remove a currency nobody references
    ///
    /// Checks registry-internal references (domiciles). Asset references
    /// are the facade's responsibility.
    pub fn remove_currency(&self, code: CurrencyCode) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.currencies.contains_key(&code) {
            return Err(SecmasterError::NotFound(format!("currency {}", code)));
        }
        if inner.domiciles.values().any(|d| d.currency == code) {
            return Err(SecmasterError::InUse(format!(
                "currency {} is referenced by a domicile",
                code
            )));
        }
        info!("Removing currency {}", code);
        inner.currencies.remove(&code);
        Ok(())
    }

    /// Remove a domicile no institution references
    pub fn remove_domicile(&self, country: CountryCode) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.domiciles.contains_key(&country) {
            return Err(SecmasterError::NotFound(format!("domicile {}", country)));
        }
        if inner.institutions.values().any(|e| e.domicile == country) {
            return Err(SecmasterError::InUse(format!(
                "domicile {} is referenced by an institution",
                country
            )));
        }
        info!("Removing domicile {}", country);
        inner.domiciles.remove(&country);
        Ok(())
    }

    /// Remove an institution. Asset references are the facade's
    /// responsibility.
    pub fn remove_institution(&self, id: EntityId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let entity = inner
            .institutions
            .remove(&id)
            .ok_or_else(|| SecmasterError::NotFound(format!("entity {}", id)))?;
        match &entity.role {
            InstitutionRole::Issuer => {
                inner.issuer_index.remove(&(entity.name.clone(), entity.domicile));
            }
            InstitutionRole::Exchange { mic } => {
                inner.exchange_index.remove(mic);
            }
        }
        info!("Removed entity {} ({})", id, entity.name);
        Ok(())
    }

    pub fn currency_count(&self) -> usize {
        self.inner.read().unwrap().currencies.len()
    }

    pub fn institution_count(&self) -> usize {
        self.inner.read().unwrap().institutions.len()
    }
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
