//! Role-based navigation

pub mod composer;

pub use composer::{
    compose_for_role_name, compose_quick_actions, entries_for, flag_keys, NavigationEntry,
};
