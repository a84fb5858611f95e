pub mod challenges;
pub mod games;
pub mod imports;
pub mod library;
pub mod recommendations;
