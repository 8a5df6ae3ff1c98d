//! HTTP routes besides `/graphql`

pub mod health;
