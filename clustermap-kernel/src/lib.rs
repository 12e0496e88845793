//! Ingestion de l'état d'un cluster Slurm (sinfo/squeue) et exposition HTTP
//! d'un snapshot cohérent : nœuds, jobs, partitions, estimation d'attente.

pub mod config;
pub mod eta;
pub mod health;
pub mod http;
pub mod models;
pub mod parsers;
pub mod poller;
pub mod query;
pub mod reasons;
pub mod reconcile;
pub mod runner;
pub mod state;
