mod backpressure_case;
