fn main() {
    em61_pipeline::cli::run();
}
