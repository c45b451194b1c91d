// ABOUTME: Label keys stamped on containers this tool creates.
// ABOUTME: Lets status and cleanup find managed and probe containers.

pub const MANAGED: &str = "shipit.managed";
pub const CONTAINER: &str = "shipit.container";
pub const PROBE: &str = "shipit.probe";
