//! Asset catalog - creation, lifecycle and natural-key lookup
//!
//! Owns the id space for assets and enforces referential closure on
//! creation: every entity, currency or asset an asset points at must
//! already exist and have the right role. Creation is idempotent by
//! natural key, mirroring the registry's upsert contract.

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::asset::{Asset, AssetDetail, AssetKind, AssetStatus, EtfDetail, ForexDetail, IndexDetail, ListedDetail, ShareDetail};
use crate::assets::isin;
use crate::error::{Result, SecmasterError};
use crate::registry::ReferenceRegistry;
use crate::types::{AssetId, CurrencyCode, EntityId, Mic, QuoteUnits};

/// Everything needed to create an asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    pub name: String,
    pub currency: CurrencyCode,
    pub owner: Option<EntityId>,
    pub quote_units: QuoteUnits,
    pub detail: AssetDetail,
}

impl AssetSpec {
    pub fn new(name: &str, currency: CurrencyCode, owner: Option<EntityId>, detail: AssetDetail) -> Self {
        Self {
            name: name.to_string(),
            currency,
            owner,
            quote_units: QuoteUnits::default(),
            detail,
        }
    }

    pub fn with_quote_units(mut self, units: QuoteUnits) -> Self {
        self.quote_units = units;
        self
    }

    /// Plain cash in a currency, held by an owning entity
    pub fn cash(currency: CurrencyCode, owner: EntityId) -> Self {
        Self::new(&format!("{} Cash", currency), currency, Some(owner), AssetDetail::Cash)
    }

    pub fn cash_account(currency: CurrencyCode, owner: EntityId) -> Self {
        Self::new(
            &format!("{} Cash Account", currency),
            currency,
            Some(owner),
            AssetDetail::CashAccount,
        )
    }

    pub fn settlement_account(currency: CurrencyCode, owner: EntityId) -> Self {
        Self::new(
            &format!("{} Settlement Account", currency),
            currency,
            Some(owner),
            AssetDetail::SettlementAccount,
        )
    }

    /// A currency pair: one unit of `base` priced in `quote`
    pub fn forex(base: CurrencyCode, quote: CurrencyCode, owner: EntityId) -> Self {
        let detail = ForexDetail { base };
        Self::new(&detail.pair_ticker(quote), quote, Some(owner), AssetDetail::Forex(detail))
    }

    /// A published index; indices carry no owner
    pub fn index(name: &str, ticker: &str, currency: CurrencyCode, total_return: bool) -> Self {
        Self::new(
            name,
            currency,
            None,
            AssetDetail::Index(IndexDetail {
                ticker: ticker.to_string(),
                total_return,
            }),
        )
    }

    /// An unlisted share; the issuer also owns the asset record
    pub fn share(name: &str, currency: CurrencyCode, issuer: EntityId) -> Self {
        Self::new(
            name,
            currency,
            Some(issuer),
            AssetDetail::Share(ShareDetail {
                issuer,
                shares_in_issue: None,
                distributions: false,
            }),
        )
    }

    /// A listed ordinary share
    pub fn listed_equity(
        name: &str,
        currency: CurrencyCode,
        issuer: EntityId,
        exchange: EntityId,
        ticker: &str,
        isin: &str,
    ) -> Self {
        Self::new(
            name,
            currency,
            Some(issuer),
            AssetDetail::ListedEquity(ListedDetail {
                share: ShareDetail {
                    issuer,
                    shares_in_issue: None,
                    distributions: true,
                },
                ticker: ticker.to_string(),
                isin: isin.to_string(),
                exchange,
            }),
        )
    }

    /// An exchange-traded fund replicating `index`
    #[allow(clippy::too_many_arguments)]
    pub fn etf(
        name: &str,
        currency: CurrencyCode,
        issuer: EntityId,
        exchange: EntityId,
        ticker: &str,
        isin: &str,
        index: AssetId,
        ter: Option<f64>,
    ) -> Self {
        Self::new(
            name,
            currency,
            Some(issuer),
            AssetDetail::Etf(EtfDetail {
                listed: ListedDetail {
                    share: ShareDetail {
                        issuer,
                        shares_in_issue: None,
                        distributions: true,
                    },
                    ticker: ticker.to_string(),
                    isin: isin.to_string(),
                    exchange,
                },
                index,
                ter,
            }),
        )
    }
}

/// Natural key identifying an asset for idempotent creation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NaturalKey {
    /// Cash-family assets are unique per (kind, currency, owner)
    Cash(AssetKind, CurrencyCode, EntityId),
    /// Ordered currency pair
    Pair(CurrencyCode, CurrencyCode),
    IndexTicker(String),
    Isin(String),
    /// Unlisted shares are unique per (issuer, name)
    ShareName(EntityId, String),
}

#[derive(Default)]
struct CatalogInner {
    assets: HashMap<AssetId, Asset>,
    keys: HashMap<NaturalKey, AssetId>,
    /// (exchange, ticker) secondary unique index
    listings: HashMap<(EntityId, String), AssetId>,
    next_id: AssetId,
}

/// Central asset store
pub struct AssetCatalog {
    registry: Arc<ReferenceRegistry>,
    inner: RwLock<CatalogInner>,
}

impl AssetCatalog {
    pub fn new(registry: Arc<ReferenceRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(CatalogInner {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Create an asset, or return the existing one with the same natural key
    ///
    /// Identity attributes (kind, currency, owner, references, identifiers)
    /// must match an existing record exactly; descriptive attributes (name,
    /// ticker, share capital, TER) are updated in place on re-creation.
    pub fn create(&self, spec: AssetSpec) -> Result<AssetId> {
        let spec = self.validate(spec)?;
        let key = Self::natural_key(&spec);

        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.keys.get(&key) {
            Self::reconcile(&mut inner, id, &spec)?;
            debug!("Asset {} already exists as {}", spec.name, id);
            return Ok(id);
        }

        // ETF index reference is an intra-catalog check, done under the lock
        if let AssetDetail::Etf(etf) = &spec.detail {
            match inner.assets.get(&etf.index) {
                None => {
                    return Err(SecmasterError::Integrity(format!(
                        "etf references missing index asset {}",
                        etf.index
                    )))
                }
                Some(ix) if ix.kind() != AssetKind::Index => {
                    return Err(SecmasterError::TypeMismatch(format!(
                        "asset {} is a {}, not an Index",
                        etf.index,
                        ix.kind()
                    )))
                }
                Some(_) => {}
            }
        }

        if let Some(listing) = spec.detail.listing() {
            let lkey = (listing.exchange, listing.ticker.clone());
            if let Some(&other) = inner.listings.get(&lkey) {
                return Err(SecmasterError::Integrity(format!(
                    "ticker {} on exchange {} already taken by asset {}",
                    listing.ticker, listing.exchange, other
                )));
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let asset = Asset {
            id,
            name: spec.name.clone(),
            currency: spec.currency,
            owner: spec.owner,
            quote_units: spec.quote_units,
            status: AssetStatus::Active,
            detail: spec.detail.clone(),
        };
        info!("Created {} asset {} ({})", asset.kind(), id, asset.name);
        if let Some(listing) = asset.detail.listing() {
            inner.listings.insert((listing.exchange, listing.ticker.clone()), id);
        }
        inner.keys.insert(key, id);
        inner.assets.insert(id, asset);
        Ok(id)
    }

    /// Check referential closure and kind rules, normalizing identifiers
    ///
    /// A reference to a record that does not exist is an integrity error;
    /// a reference to one of the wrong kind is a type mismatch.
    fn validate(&self, mut spec: AssetSpec) -> Result<AssetSpec> {
        if !self.registry.has_currency(spec.currency) {
            return Err(SecmasterError::Integrity(format!(
                "asset {} references missing currency {}",
                spec.name, spec.currency
            )));
        }

        let kind = spec.detail.kind();
        match (kind, spec.owner) {
            (AssetKind::Index, Some(owner)) => {
                return Err(SecmasterError::TypeMismatch(format!(
                    "index assets have no owner, got entity {}",
                    owner
                )))
            }
            (AssetKind::Index, None) => {}
            (_, None) => {
                return Err(SecmasterError::TypeMismatch(format!(
                    "{} assets require an owning entity",
                    kind
                )))
            }
            (_, Some(owner)) => {
                if !self.registry.has_institution(owner) {
                    return Err(SecmasterError::Integrity(format!(
                        "asset owner references missing entity {}",
                        owner
                    )));
                }
            }
        }

        if let AssetDetail::Forex(fx) = &spec.detail {
            if fx.base == spec.currency {
                return Err(SecmasterError::Integrity(format!(
                    "forex pair legs must differ, got {}",
                    fx.base
                )));
            }
            if !self.registry.has_currency(fx.base) {
                return Err(SecmasterError::Integrity(format!(
                    "forex pair references missing currency {}",
                    fx.base
                )));
            }
        }

        let issuer_domicile = match spec.detail.share() {
            Some(share) => {
                let issuer = self.registry.get_institution(share.issuer).map_err(|_| {
                    SecmasterError::Integrity(format!(
                        "share references missing issuer entity {}",
                        share.issuer
                    ))
                })?;
                if !issuer.is_issuer() {
                    return Err(SecmasterError::TypeMismatch(format!(
                        "entity {} is not an issuer",
                        share.issuer
                    )));
                }
                Some(issuer.domicile)
            }
            None => None,
        };

        if let Some(listing) = spec.detail.listing() {
            let exchange = self.registry.get_institution(listing.exchange).map_err(|_| {
                SecmasterError::Integrity(format!(
                    "listing references missing exchange entity {}",
                    listing.exchange
                ))
            })?;
            if !exchange.is_exchange() {
                return Err(SecmasterError::TypeMismatch(format!(
                    "entity {} is not an exchange",
                    listing.exchange
                )));
            }
            if listing.ticker.trim().is_empty() {
                return Err(SecmasterError::Integrity("listing ticker is empty".to_string()));
            }
            let compact = isin::validate(&listing.isin)?;
            if let Some(domicile) = issuer_domicile {
                if isin::country_prefix(&compact) != domicile.as_str() {
                    return Err(SecmasterError::Integrity(format!(
                        "ISIN {} does not match issuer domicile {}",
                        compact, domicile
                    )));
                }
            }
            set_isin(&mut spec.detail, compact);
        }

        Ok(spec)
    }

    fn natural_key(spec: &AssetSpec) -> NaturalKey {
        Self::key_parts(&spec.detail, spec.currency, spec.owner, &spec.name)
    }

    fn key_parts(
        detail: &AssetDetail,
        currency: CurrencyCode,
        owner: Option<EntityId>,
        name: &str,
    ) -> NaturalKey {
        match detail {
            AssetDetail::Cash | AssetDetail::CashAccount | AssetDetail::SettlementAccount => {
                // validate() guarantees an owner for cash-family kinds
                NaturalKey::Cash(detail.kind(), currency, owner.unwrap_or(0))
            }
            AssetDetail::Forex(fx) => NaturalKey::Pair(fx.base, currency),
            AssetDetail::Index(ix) => NaturalKey::IndexTicker(ix.ticker.clone()),
            AssetDetail::Share(sh) => NaturalKey::ShareName(sh.issuer, name.to_string()),
            AssetDetail::Listed(l) | AssetDetail::ListedEquity(l) => NaturalKey::Isin(l.isin.clone()),
            AssetDetail::Etf(e) => NaturalKey::Isin(e.listed.isin.clone()),
        }
    }

    /// Reload an asset persisted earlier, keeping its original id and
    /// status. Callers replay in ascending id order so intra-catalog
    /// references (ETF to index) always land on already-restored rows.
    pub(crate) fn restore(&self, asset: Asset) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.assets.contains_key(&asset.id) {
            return Err(SecmasterError::Integrity(format!("asset {} already exists", asset.id)));
        }
        let key = Self::key_parts(&asset.detail, asset.currency, asset.owner, &asset.name);
        if let Some(&other) = inner.keys.get(&key) {
            return Err(SecmasterError::Integrity(format!(
                "asset {} duplicates the natural key of asset {}",
                asset.id, other
            )));
        }
        if let Some(listing) = asset.detail.listing() {
            inner.listings.insert((listing.exchange, listing.ticker.clone()), asset.id);
        }
        inner.keys.insert(key, asset.id);
        inner.next_id = inner.next_id.max(asset.id + 1);
        inner.assets.insert(asset.id, asset);
        Ok(())
    }

    /// Fold a re-created spec into the existing asset
    fn reconcile(inner: &mut CatalogInner, id: AssetId, spec: &AssetSpec) -> Result<()> {
        let existing = inner.assets.get(&id).ok_or_else(|| {
            SecmasterError::ConsistencyFault(format!("natural key points at missing asset {}", id))
        })?;

        if existing.kind() != spec.detail.kind() {
            return Err(SecmasterError::Integrity(format!(
                "asset {} is a {}, cannot recreate as {}",
                id,
                existing.kind(),
                spec.detail.kind()
            )));
        }
        if existing.currency != spec.currency || existing.owner != spec.owner {
            return Err(SecmasterError::Integrity(format!(
                "asset {} recreated with conflicting currency or owner",
                id
            )));
        }
        match (&existing.detail, &spec.detail) {
            (AssetDetail::Share(a), AssetDetail::Share(b)) if a.issuer != b.issuer => {
                return Err(SecmasterError::Integrity(format!(
                    "asset {} recreated with a different issuer",
                    id
                )));
            }
            (AssetDetail::Etf(a), AssetDetail::Etf(b)) if a.index != b.index => {
                return Err(SecmasterError::Integrity(format!(
                    "ETF {} recreated replicating a different index",
                    id
                )));
            }
            _ => {}
        }
        if let (Some(a), Some(b)) = (existing.detail.listing(), spec.detail.listing()) {
            if a.share.issuer != b.share.issuer || a.exchange != b.exchange {
                return Err(SecmasterError::Integrity(format!(
                    "asset {} recreated with a different issuer or exchange",
                    id
                )));
            }
            // Ticker changes are routine; move the secondary index
            if a.ticker != b.ticker {
                let lkey = (b.exchange, b.ticker.clone());
                if let Some(&other) = inner.listings.get(&lkey) {
                    if other != id {
                        return Err(SecmasterError::Integrity(format!(
                            "ticker {} on exchange {} already taken by asset {}",
                            b.ticker, b.exchange, other
                        )));
                    }
                }
                let old = (a.exchange, a.ticker.clone());
                info!("Asset {} ticker change {} -> {}", id, a.ticker, b.ticker);
                inner.listings.remove(&old);
                inner.listings.insert(lkey, id);
            }
        }

        let asset = inner.assets.get_mut(&id).ok_or_else(|| {
            SecmasterError::ConsistencyFault(format!("natural key points at missing asset {}", id))
        })?;
        asset.name = spec.name.clone();
        asset.quote_units = spec.quote_units;
        asset.detail = spec.detail.clone();
        Ok(())
    }

    /// Mark an asset closed. History stays readable; closing again is a no-op.
    pub fn close(&self, id: AssetId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let asset = inner
            .assets
            .get_mut(&id)
            .ok_or_else(|| SecmasterError::NotFound(format!("asset {}", id)))?;
        if asset.status == AssetStatus::Closed {
            debug!("Asset {} already closed", id);
            return Ok(());
        }
        asset.status = AssetStatus::Closed;
        info!("Closed asset {} ({})", id, asset.name);
        Ok(())
    }

    pub fn retrieve(&self, id: AssetId) -> Result<Asset> {
        self.inner
            .read()
            .unwrap()
            .assets
            .get(&id)
            .cloned()
            .ok_or_else(|| SecmasterError::NotFound(format!("asset {}", id)))
    }

    pub fn find_by_isin(&self, raw: &str) -> Result<Asset> {
        let compact = isin::validate(raw)?;
        let inner = self.inner.read().unwrap();
        let id = inner
            .keys
            .get(&NaturalKey::Isin(compact.clone()))
            .ok_or_else(|| SecmasterError::NotFound(format!("ISIN {}", compact)))?;
        Self::fetch(&inner, *id)
    }

    /// Resolve a listing by exchange MIC and ticker
    pub fn find_listing(&self, mic: Mic, ticker: &str) -> Result<Asset> {
        let exchange = self.registry.lookup_exchange(mic)?;
        let inner = self.inner.read().unwrap();
        let id = inner
            .listings
            .get(&(exchange.id, ticker.to_string()))
            .ok_or_else(|| SecmasterError::NotFound(format!("listing {}.{}", ticker, mic)))?;
        Self::fetch(&inner, *id)
    }

    pub fn find_pair(&self, base: CurrencyCode, quote: CurrencyCode) -> Result<Asset> {
        let inner = self.inner.read().unwrap();
        let id = inner
            .keys
            .get(&NaturalKey::Pair(base, quote))
            .ok_or_else(|| SecmasterError::NotFound(format!("forex pair {}{}", base, quote)))?;
        Self::fetch(&inner, *id)
    }

    pub fn find_index(&self, ticker: &str) -> Result<Asset> {
        let inner = self.inner.read().unwrap();
        let id = inner
            .keys
            .get(&NaturalKey::IndexTicker(ticker.to_string()))
            .ok_or_else(|| SecmasterError::NotFound(format!("index {}", ticker)))?;
        Self::fetch(&inner, *id)
    }

    pub fn find_cash(&self, kind: AssetKind, currency: CurrencyCode, owner: EntityId) -> Result<Asset> {
        if !kind.is_cash_like() {
            return Err(SecmasterError::TypeMismatch(format!("{} is not a cash kind", kind)));
        }
        let inner = self.inner.read().unwrap();
        let id = inner
            .keys
            .get(&NaturalKey::Cash(kind, currency, owner))
            .ok_or_else(|| {
                SecmasterError::NotFound(format!("{} {} for entity {}", currency, kind, owner))
            })?;
        Self::fetch(&inner, *id)
    }

    fn fetch(inner: &CatalogInner, id: AssetId) -> Result<Asset> {
        inner.assets.get(&id).cloned().ok_or_else(|| {
            SecmasterError::ConsistencyFault(format!("index points at missing asset {}", id))
        })
    }

    pub fn assets_by_kind(&self, kind: AssetKind) -> Vec<Asset> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .assets
            .values()
            .filter(|a| a.kind() == kind)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        out
    }

    /// All listed-family assets trading on an exchange entity
    pub fn listed_on(&self, exchange: EntityId) -> Vec<Asset> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .assets
            .values()
            .filter(|a| a.detail.listing().map(|l| l.exchange) == Some(exchange))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        out
    }

    /// All share-family assets issued by an issuer entity
    pub fn issued_by(&self, issuer: EntityId) -> Vec<Asset> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .assets
            .values()
            .filter(|a| a.detail.share().map(|s| s.issuer) == Some(issuer))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        out
    }

    /// All ETFs replicating an index asset
    pub fn etfs_tracking(&self, index: AssetId) -> Vec<Asset> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .unwrap()
            .assets
            .values()
            .filter(|a| a.detail.etf().map(|e| e.index) == Some(index))
            .cloned()
            .collect();
        out.sort_by_key(|a| a.id);
        out
    }

    pub fn all_assets(&self) -> Vec<Asset> {
        let mut out: Vec<_> = self.inner.read().unwrap().assets.values().cloned().collect();
        out.sort_by_key(|a| a.id);
        out
    }

    pub fn asset_count(&self) -> usize {
        self.inner.read().unwrap().assets.len()
    }

    /// Whether any asset references the entity (as owner, issuer or exchange)
    pub fn references_entity(&self, entity: EntityId) -> bool {
        self.inner.read().unwrap().assets.values().any(|a| {
            a.owner == Some(entity)
                || a.detail.share().map(|s| s.issuer) == Some(entity)
                || a.detail.listing().map(|l| l.exchange) == Some(entity)
        })
    }

    /// Whether any asset prices in, or has a forex leg in, the currency
    pub fn references_currency(&self, code: CurrencyCode) -> bool {
        self.inner.read().unwrap().assets.values().any(|a| {
            a.currency == code || a.detail.forex().map(|fx| fx.base) == Some(code)
        })
    }
}

fn set_isin(detail: &mut AssetDetail, compact: String) {
    match detail {
        AssetDetail::Listed(l) | AssetDetail::ListedEquity(l) => l.isin = compact,
        AssetDetail::Etf(e) => e.listed.isin = compact,
        _ => {}
    }
}
