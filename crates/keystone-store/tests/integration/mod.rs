mod atomicity;
mod persistence;
