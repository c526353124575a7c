//! UPF routing core
//!
//! Ties the packet pipeline to S1AP session learning: the [`Router`]
//! observes S1AP InitialContextSetup exchanges and maintains the UE map
//! (UE IPv4 address -> GTPv1-U tunnel endpoints); the
//! [`Gtpv1uEncapSink`] uses that map to encapsulate plain IPv4 traffic
//! towards the right tunnel; the [`RuleMatcher`] classifies IPv4 packets
//! with an ordered first-match rule list.

pub mod encap_sink;
pub mod error;
pub mod router;
pub mod rule;

pub use encap_sink::Gtpv1uEncapSink;
pub use error::{RouterError, RouterResult};
pub use router::{Router, SetupKey, UeMap};
pub use rule::{MatchingRule, RuleMatcher};
