//! Library half of the `gs-twin-cli` demo harness: a guest-side command
//! buffer builder and the scenario functions the binary dispatches to.
pub mod command_buffer;
pub mod scenarios;
