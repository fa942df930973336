//! Building blocks of the `batchline` binary: the customer import and the
//! resolution of job files into runnable jobs.

pub mod customer;
pub mod resolve;
