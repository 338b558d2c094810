//! Test suite for the equipment driver core.

#[cfg(test)]
mod support;

#[cfg(test)]
mod escalation;

#[cfg(test)]
mod full_cycle;

#[cfg(test)]
mod reprobe;

#[cfg(test)]
mod resumption;
