#![cfg(test)]

mod devices;
mod linker;
mod progs;
