#![allow(dead_code)]

pub(crate) mod logging;

pub(crate) mod graphs;

pub(crate) mod swarm;
