//! # Log Matcher
//!
//! Decides which on-chain logs belong to this system.
//!
//! - **Filter parameters**: narrow an `eth_getLogs` query to the allow-listed
//!   contracts and the known event signatures (OR on topic0).
//! - **Revalidation**: [`LogMatcher::accept`] re-checks every returned log
//!   locally. Providers are not trusted to honour the filter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let signatures = EventSignatureSet::resolve(&abi, &["Deposit", "Withdraw"])?;
//! let matcher = LogMatcher::new(signatures, AddressAllowList::parse(&csv)?);
//! let params = matcher.build_filter_params(range);
//! let logs = matcher.retain_matching(pool.get_logs(&params).await?);
//! ```

use crate::error::ConfigError;
use crate::metrics;
use crate::types::conversions::{address_to_string, string_to_address};
use crate::types::BlockRange;
use ethers::abi::Abi;
use ethers::types::{Address, Filter, Log, ValueOrArray, H256, U64};
use log::debug;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Event name → topic0 lookup, supplied by whoever loads the ABI.
pub trait SignatureLookup {
    fn event_topic(&self, name: &str) -> Option<H256>;
}

impl SignatureLookup for Abi {
    fn event_topic(&self, name: &str) -> Option<H256> {
        self.event(name).ok().map(|event| event.signature())
    }
}

impl SignatureLookup for HashMap<String, H256> {
    fn event_topic(&self, name: &str) -> Option<H256> {
        self.get(name).copied()
    }
}

/// Ordered, de-duplicated topic0 hashes of the recognised events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignatureSet {
    entries: Vec<(String, H256)>,
}

impl EventSignatureSet {
    /// Resolves every name in `names`. Any missing name fails the whole set.
    pub fn resolve<L, S>(lookup: &L, names: &[S]) -> Result<Self, ConfigError>
    where
        L: SignatureLookup + ?Sized,
        S: AsRef<str>,
    {
        if names.is_empty() {
            return Err(ConfigError::NoRequiredEvents);
        }

        let mut entries: Vec<(String, H256)> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let topic = lookup
                .event_topic(name)
                .ok_or_else(|| ConfigError::MissingEventSignature(name.to_string()))?;
            if !entries.iter().any(|(_, existing)| *existing == topic) {
                entries.push((name.to_string(), topic));
            }
        }
        Ok(Self { entries })
    }

    pub fn signatures(&self) -> Vec<H256> {
        self.entries.iter().map(|(_, topic)| *topic).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, topic: &H256) -> bool {
        self.entries.iter().any(|(_, t)| t == topic)
    }

    pub fn name_of(&self, topic: &H256) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, t)| t == topic)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Contracts whose logs are in scope. Empty means any contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressAllowList {
    addresses: HashSet<Address>,
}

impl AddressAllowList {
    pub fn any() -> Self {
        Self::default()
    }

    /// Comma-delimited list, any letter case. Blank entries are skipped.
    pub fn parse(csv: &str) -> Result<Self, ConfigError> {
        Self::from_strings(csv.split(','))
    }

    pub fn from_strings<I, S>(items: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addresses = HashSet::new();
        for item in items {
            let item = item.as_ref().trim();
            if item.is_empty() {
                continue;
            }
            addresses.insert(string_to_address(item)?);
        }
        Ok(Self { addresses })
    }

    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains(address)
    }

    /// Sorted copy, so filter parameters are deterministic.
    pub fn sorted(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.addresses.iter().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn to_lowercase_strings(&self) -> Vec<String> {
        self.sorted().into_iter().map(address_to_string).collect()
    }
}

/// Body of an `eth_getLogs` request.
///
/// Serialises as `{fromBlock, toBlock, address?, topics: [[sig, ...]]}` with hex
/// quantities and lower-case addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterParams {
    from_block: U64,
    to_block: U64,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<Vec<Address>>,
    topics: Vec<Vec<H256>>,
}

impl LogFilterParams {
    pub fn from_block(&self) -> u64 {
        self.from_block.as_u64()
    }

    pub fn to_block(&self) -> u64 {
        self.to_block.as_u64()
    }

    pub fn address(&self) -> Option<&[Address]> {
        self.address.as_deref()
    }

    pub fn topic0(&self) -> &[H256] {
        self.topics.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Equivalent `ethers` filter, for callers driving an ethers `Provider`.
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new()
            .from_block(self.from_block)
            .to_block(self.to_block)
            .topic0(ValueOrArray::Array(
                self.topic0().iter().map(|t| Some(*t)).collect(),
            ));
        if let Some(addresses) = &self.address {
            filter = filter.address(ValueOrArray::Array(addresses.clone()));
        }
        filter
    }
}

#[derive(Debug, Clone)]
pub struct LogMatcher {
    signatures: EventSignatureSet,
    allow_list: AddressAllowList,
}

impl LogMatcher {
    pub fn new(signatures: EventSignatureSet, allow_list: AddressAllowList) -> Self {
        Self {
            signatures,
            allow_list,
        }
    }

    pub fn signatures(&self) -> &EventSignatureSet {
        &self.signatures
    }

    pub fn allow_list(&self) -> &AddressAllowList {
        &self.allow_list
    }

    pub fn build_filter_params(&self, range: BlockRange) -> LogFilterParams {
        let address = if self.allow_list.is_empty() {
            None
        } else {
            Some(self.allow_list.sorted())
        };
        LogFilterParams {
            from_block: U64::from(range.from_block().as_u64()),
            to_block: U64::from(range.to_block().as_u64()),
            address,
            topics: vec![self.signatures.signatures()],
        }
    }

    /// True iff the log's address is allowed and its topic0 is a known
    /// signature. Pure; safe to call any number of times.
    pub fn accept(&self, log: &Log) -> bool {
        self.matches(&log.address, log.topics.first())
    }

    pub fn matches(&self, address: &Address, topic0: Option<&H256>) -> bool {
        let address_ok = self.allow_list.is_empty() || self.allow_list.contains(address);
        let topic_ok = topic0.map_or(false, |t| self.signatures.contains(t));
        address_ok && topic_ok
    }

    /// Keeps only accepted logs, in provider order.
    pub fn retain_matching(&self, logs: Vec<Log>) -> Vec<Log> {
        let total = logs.len();
        let kept: Vec<Log> = logs.into_iter().filter(|log| self.accept(log)).collect();
        let rejected = total - kept.len();
        if rejected > 0 {
            debug!(
                "LogMatcher: dropped {} of {} provider log(s) failing revalidation",
                rejected, total
            );
            metrics::add_logs_rejected(rejected);
        }
        kept
    }
}
