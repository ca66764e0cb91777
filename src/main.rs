fn main() {
    optgrouper::cli::run();
}
