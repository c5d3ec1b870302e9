mod backpressure;
mod batching;
mod read_your_writes;
