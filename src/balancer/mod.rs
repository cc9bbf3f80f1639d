//! Weighted load balancing across eligible providers.

mod strategy;
mod weights;

pub use strategy::{
    create, LoadBalancer, Priority, RoundRobin, WeightedRandom, WeightedRoundRobin,
};
pub use weights::{normalize, ProviderWeight, WeightTable, WEIGHT_SCALE};
