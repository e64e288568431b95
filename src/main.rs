fn main() {
    feature_cluster::cli::run();
}
