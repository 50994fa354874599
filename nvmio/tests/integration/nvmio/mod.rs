// vim: tw=80
mod idfy;
mod info;
mod report;
mod rw;
