//! Utility functions for the library.
