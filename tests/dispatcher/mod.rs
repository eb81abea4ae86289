mod exactly_once_case;
mod fairness_case;
mod wake_case;
