// src/lib.rs
//
// Backend de gestão de compras: solicitações, cascata de aprovação em
// níveis e rastreamento de recepções.

pub mod common;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
