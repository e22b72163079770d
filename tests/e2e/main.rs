//! End-to-end scenarios for checkpointed workspaces.

mod scenarios;
