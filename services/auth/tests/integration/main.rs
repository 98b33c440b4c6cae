mod helpers;
mod magic_link_test;
mod remember_me_test;
