// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) uses these modules to implement the upload flow.
//
// Module responsibilities:
// - `api`: Encapsulates HTTP interactions with DefectDojo (connectivity
//   probe, product and engagement management, scan import).
// - `run`: Validates the run configuration and drives the client through
//   the fixed upload sequence.
//
// Keeping this separation makes it easier to point the whole flow at a
// mock API in integration tests.
pub mod api;
pub mod run;
