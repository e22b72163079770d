mod lifecycle;
mod maintenance;
mod migration;
mod restore_safety;
