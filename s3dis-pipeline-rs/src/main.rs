fn main() {
    s3dis_pipeline::cli::run();
}
