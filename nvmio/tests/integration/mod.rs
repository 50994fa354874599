// vim: tw=80
mod nvmio;
mod util;

use util::*;
