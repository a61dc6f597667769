//! Invoice computation, provider selection and the invoice lifecycle.

pub mod aggregation;
mod invoices;
pub mod provider;

pub use aggregation::{AggregationInput, InvoiceComputation, aggregate};
pub use provider::{InvoiceProvider, InvoiceProviderRegistry};
